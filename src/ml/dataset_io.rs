//! CSV persistence for labeled datasets
//!
//! Files carry the header `Severity,Rm_B,Rm_F,Pachy_Min`. Columns are
//! matched by name on read, so extra columns and any column order are
//! accepted; a missing required column is an error.

use crate::error::{AppError, Result};
use crate::ml::models::{Dataset, LabeledSample};
use crate::models::{CornealMeasurement, Severity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
struct DatasetRecord {
    #[serde(rename = "Severity")]
    severity: Severity,
    #[serde(rename = "Rm_B")]
    rm_b: f64,
    #[serde(rename = "Rm_F")]
    rm_f: f64,
    #[serde(rename = "Pachy_Min")]
    pachy_min: f64,
}

impl From<&LabeledSample> for DatasetRecord {
    fn from(sample: &LabeledSample) -> Self {
        Self {
            severity: sample.severity,
            rm_b: sample.measurement.rm_b,
            rm_f: sample.measurement.rm_f,
            pachy_min: sample.measurement.pachy_min,
        }
    }
}

impl From<DatasetRecord> for LabeledSample {
    fn from(record: DatasetRecord) -> Self {
        LabeledSample::new(
            record.severity,
            CornealMeasurement::new(record.rm_b, record.rm_f, record.pachy_min),
        )
    }
}

/// Read a dataset CSV
pub fn read_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "dataset file {}",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let samples = reader
        .deserialize::<DatasetRecord>()
        .map(|record| record.map(LabeledSample::from))
        .collect::<std::result::Result<Vec<_>, csv::Error>>()?;

    debug!(path = %path.display(), rows = samples.len(), "Dataset loaded");
    Ok(Dataset::from_samples(&samples))
}

/// Write a dataset CSV, creating parent directories
pub fn write_dataset(path: impl AsRef<Path>, dataset: &Dataset) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    for sample in dataset.to_samples() {
        writer.serialize(DatasetRecord::from(&sample))?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = dataset.n_samples(), "Dataset written");
    Ok(())
}

/// Write serializable rows (metrics tables) as CSV
pub fn write_records<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_dataset() -> Dataset {
        Dataset::from_samples(&[
            LabeledSample::new(Severity::Normal, CornealMeasurement::new(6.41, 7.72, 518.3)),
            LabeledSample::new(Severity::Severe, CornealMeasurement::new(4.6, 6.0, 395.0)),
        ])
    }

    #[test]
    fn test_write_creates_header_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/raw/data.csv");

        write_dataset(&path, &small_dataset()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Severity,Rm_B,Rm_F,Pachy_Min\n"));
        assert!(text.contains("4,4.6,6.0,395.0"));
    }

    #[test]
    fn test_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let dataset = small_dataset();

        write_dataset(&path, &dataset).unwrap();
        assert_eq!(read_dataset(&path).unwrap(), dataset);
    }

    #[test]
    fn test_read_reordered_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "Pachy_Min,Rm_F,Rm_B,Severity\n450,7.0,5.7,2\n").unwrap();

        let dataset = read_dataset(&path).unwrap();
        assert_eq!(dataset.labels, vec![Severity::Moderate]);
        assert_eq!(dataset.features[[0, 0]], 5.7);
        assert_eq!(dataset.features[[0, 2]], 450.0);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = read_dataset("/definitely/not/here.csv").unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_missing_column_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "Severity,Rm_B,Rm_F\n0,6.5,7.8\n").unwrap();

        assert_eq!(read_dataset(&path).unwrap_err().error_code(), "DATASET_ERROR");
    }

    #[test]
    fn test_label_out_of_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "Severity,Rm_B,Rm_F,Pachy_Min\n7,6.5,7.8,520\n").unwrap();

        assert!(read_dataset(&path).is_err());
    }
}
