use crate::error::{AppError, Result};
use crate::metrics::{MODEL_LOADED, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS, PREDICTION_ERRORS_TOTAL};
use crate::ml::classifier::{Classifier, RandomForestClassifier};
use crate::ml::models::{ModelMetadata, Prediction};
use crate::models::CornealMeasurement;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Read-only prediction service over a loaded model artifact
///
/// Cloning is cheap: the fitted forest sits behind an `Arc` and is shared
/// by every request.
#[derive(Clone)]
pub struct PredictionService {
    model: Arc<RandomForestClassifier>,
    model_path: PathBuf,
}

impl PredictionService {
    /// Load the artifact at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let model = RandomForestClassifier::load(path).map_err(|e| {
            MODEL_LOADED.set(0.0);
            e
        })?;
        MODEL_LOADED.set(1.0);

        info!(
            path = %path.display(),
            trees = model.n_trees(),
            training_accuracy = model.metadata().training_accuracy,
            "Prediction model ready"
        );

        Ok(Self {
            model: Arc::new(model),
            model_path: path.to_path_buf(),
        })
    }

    /// Wrap an already fitted model
    pub fn from_model(model: RandomForestClassifier, model_path: impl Into<PathBuf>) -> Result<Self> {
        if !model.is_trained() {
            return Err(AppError::ModelNotLoaded("Model not trained".to_string()));
        }
        MODEL_LOADED.set(1.0);
        Ok(Self {
            model: Arc::new(model),
            model_path: model_path.into(),
        })
    }

    /// Predict one measurement, recording metrics under `source`
    pub fn predict(&self, measurement: &CornealMeasurement, source: &str) -> Result<Prediction> {
        let start = Instant::now();
        let result = self.model.predict_measurement(measurement);
        PREDICTION_DURATION_SECONDS
            .with_label_values(&[source])
            .observe(start.elapsed().as_secs_f64());

        match &result {
            Ok(prediction) => {
                PREDICTIONS_TOTAL
                    .with_label_values(&[&prediction.stage.index().to_string()])
                    .inc();
                debug!(
                    stage = prediction.stage.index(),
                    confidence = prediction.confidence,
                    source,
                    "Prediction served"
                );
            }
            Err(e) => {
                PREDICTION_ERRORS_TOTAL
                    .with_label_values(&[e.error_code()])
                    .inc();
                warn!(error = %e, source, "Prediction failed");
            }
        }

        result
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.model.metadata()
    }

    pub fn n_trees(&self) -> usize {
        self.model.n_trees()
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}
