use crate::error::{AppError, Result};
use crate::models::{CornealMeasurement, Severity, FEATURE_NAMES, N_FEATURES, N_STAGES};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One labeled dataset row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledSample {
    pub severity: Severity,
    pub measurement: CornealMeasurement,
}

impl LabeledSample {
    pub fn new(severity: Severity, measurement: CornealMeasurement) -> Self {
        Self {
            severity,
            measurement,
        }
    }
}

/// Tabular dataset: feature matrix (n_samples × 3) plus stage labels
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature matrix in `FEATURE_NAMES` column order
    pub features: Array2<f64>,

    /// Stage labels, one per row
    pub labels: Vec<Severity>,
}

/// Min/max of a single feature column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl Dataset {
    /// Create a dataset, checking that shapes agree
    pub fn new(features: Array2<f64>, labels: Vec<Severity>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(AppError::Dataset(format!(
                "feature rows ({}) and labels ({}) differ in length",
                features.nrows(),
                labels.len()
            )));
        }
        if features.ncols() != N_FEATURES {
            return Err(AppError::Validation(format!(
                "expected {} feature columns, got {}",
                N_FEATURES,
                features.ncols()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn from_samples(samples: &[LabeledSample]) -> Self {
        let mut features = Array2::zeros((samples.len(), N_FEATURES));
        let mut labels = Vec::with_capacity(samples.len());

        for (i, sample) in samples.iter().enumerate() {
            for (j, value) in sample.measurement.to_features().into_iter().enumerate() {
                features[[i, j]] = value;
            }
            labels.push(sample.severity);
        }

        Self { features, labels }
    }

    pub fn to_samples(&self) -> Vec<LabeledSample> {
        self.features
            .axis_iter(Axis(0))
            .zip(self.labels.iter())
            .map(|(row, &severity)| {
                LabeledSample::new(severity, CornealMeasurement::new(row[0], row[1], row[2]))
            })
            .collect()
    }

    pub fn n_samples(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Rows selected by index, in the given order
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Sample count per stage, every stage present
    pub fn class_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts: BTreeMap<Severity, usize> =
            Severity::all().into_iter().map(|s| (s, 0)).collect();
        for label in &self.labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    /// Per-feature min/max keyed by column name
    pub fn feature_ranges(&self) -> Vec<(&'static str, FeatureRange)> {
        FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(j, &name)| {
                let column = self.features.column(j);
                let range = column.iter().fold(
                    FeatureRange {
                        min: f64::INFINITY,
                        max: f64::NEG_INFINITY,
                    },
                    |acc, &v| FeatureRange {
                        min: acc.min.min(v),
                        max: acc.max.max(v),
                    },
                );
                (name, range)
            })
            .collect()
    }

    /// Labels as stage indices
    pub fn label_indices(&self) -> Vec<usize> {
        self.labels.iter().map(|s| s.index()).collect()
    }
}

/// Prediction result with confidence score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted stage
    pub stage: Severity,

    /// Probability of the predicted stage (0.0 - 1.0)
    pub confidence: f64,

    /// Probability per stage, indexed by stage
    pub probabilities: [f64; N_STAGES],
}

impl Prediction {
    /// Build from a probability row; the stage is the arg-max, ties to the lower stage
    pub fn from_probabilities(probabilities: [f64; N_STAGES]) -> Self {
        let best = argmax(&probabilities);
        Self {
            stage: Severity::from_index(best).unwrap_or(Severity::Normal),
            confidence: probabilities[best],
            probabilities,
        }
    }
}

/// Index of the first maximum
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Model evaluation metrics (fractions, 0.0 - 1.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,

    /// Support-weighted precision
    pub precision: f64,

    /// Support-weighted recall
    pub recall: f64,

    /// Support-weighted F1
    pub f1_score: f64,

    /// Support-weighted F2 (recall-leaning)
    pub f2_score: f64,

    /// Confusion matrix, rows true stage, columns predicted stage
    pub confusion_matrix: Array2<usize>,

    /// Per-class metrics keyed by stage index
    pub per_class_metrics: BTreeMap<usize, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            f2_score: 0.0,
            confusion_matrix: Array2::zeros((N_STAGES, N_STAGES)),
            per_class_metrics: BTreeMap::new(),
        }
    }

    /// Macro average of a per-class metric
    ///
    /// Only stages that occur as a true or a predicted label take part.
    pub fn macro_average(&self, metric: impl Fn(&ClassMetrics) -> f64) -> f64 {
        let values: Vec<f64> = self
            .present_labels()
            .iter()
            .filter_map(|index| self.per_class_metrics.get(index))
            .map(|m| metric(m))
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Stage indices with a non-empty row or column in the confusion matrix
    pub fn present_labels(&self) -> Vec<usize> {
        (0..self.confusion_matrix.nrows())
            .filter(|&i| {
                self.confusion_matrix.row(i).sum() > 0 || self.confusion_matrix.column(i).sum() > 0
            })
            .collect()
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Stratified cross-validation outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationResult {
    /// Accuracy per fold (0.0 - 1.0)
    pub fold_accuracies: Vec<f64>,

    pub mean_accuracy: f64,

    /// Population standard deviation across folds
    pub std_accuracy: f64,
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model version
    pub version: String,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Training accuracy (0.0 - 1.0)
    pub training_accuracy: f64,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}
