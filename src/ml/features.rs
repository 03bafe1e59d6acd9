use crate::error::{AppError, Result};
use crate::ml::models::Dataset;
use crate::models::{FEATURE_NAMES, N_FEATURES};
use ndarray::Axis;
use tracing::{debug, info};

/// Raw-to-processed preprocessing stage
///
/// The synthetic measurements are already on their natural scales and the
/// model consumes them unscaled, so this is an identity transform that
/// only validates the input.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        ensure_feature_columns(dataset)?;
        debug!(rows = dataset.n_samples(), "Preprocessing is the identity");
        Ok(dataset.clone())
    }
}

/// Selects the model input columns
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    /// Column indices into `FEATURE_NAMES`
    selected: Vec<usize>,
}

impl FeatureSelector {
    /// Selector for the fixed `Rm_B, Rm_F, Pachy_Min` subset
    pub fn new() -> Self {
        Self {
            selected: (0..N_FEATURES).collect(),
        }
    }

    /// Names of the selected columns
    pub fn selected_features(&self) -> Vec<&'static str> {
        self.selected.iter().map(|&j| FEATURE_NAMES[j]).collect()
    }

    pub fn transform(&self, dataset: &Dataset) -> Result<Dataset> {
        ensure_feature_columns(dataset)?;
        let features = dataset.features.select(Axis(1), &self.selected);
        info!(features = ?self.selected_features(), "Features selected");
        Dataset::new(features, dataset.labels.clone())
    }
}

impl Default for FeatureSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_feature_columns(dataset: &Dataset) -> Result<()> {
    if dataset.n_features() != N_FEATURES {
        return Err(AppError::Validation(format!(
            "expected feature columns {:?}, got {} columns",
            FEATURE_NAMES,
            dataset.n_features()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::generator::SyntheticDataGenerator;

    #[test]
    fn test_preprocessor_is_identity() {
        let dataset = SyntheticDataGenerator::new(10, 42).generate().unwrap();
        let processed = Preprocessor::new().transform(&dataset).unwrap();
        assert_eq!(processed, dataset);
    }

    #[test]
    fn test_selector_keeps_all_three_features() {
        let dataset = SyntheticDataGenerator::new(10, 42).generate().unwrap();
        let selector = FeatureSelector::new();

        assert_eq!(selector.selected_features(), vec!["Rm_B", "Rm_F", "Pachy_Min"]);
        assert_eq!(selector.transform(&dataset).unwrap(), dataset);
    }
}
