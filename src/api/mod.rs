pub mod handlers;
pub mod routes;
pub mod views;

pub use routes::*;

use crate::error::{AppError, Result};
use crate::metrics::MODEL_LOADED;
use crate::ml::models::ModelMetadata;
use crate::ml::service::PredictionService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// `None` when no model artifact could be loaded at startup
    pub predictor: Option<Arc<PredictionService>>,
    pub model_path: PathBuf,
    /// Why an existing artifact failed to load; `None` when the file is absent
    pub load_error: Option<String>,
}

impl AppState {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            predictor: None,
            model_path: model_path.into(),
            load_error: None,
        }
    }

    /// Load the model at `model_path`, starting without one if that fails
    pub fn load(model_path: impl AsRef<Path>) -> Self {
        let model_path = model_path.as_ref();
        let mut state = Self::new(model_path);
        match PredictionService::load(model_path) {
            Ok(service) => state.with_predictor(service),
            Err(e) => {
                MODEL_LOADED.set(0.0);
                warn!(
                    path = %model_path.display(),
                    error = %e,
                    "Starting without a model; run the pipeline to train one"
                );
                if !matches!(e, AppError::NotFound(_)) {
                    state.load_error = Some(e.to_string());
                }
                state
            }
        }
    }

    /// Set the prediction service
    pub fn with_predictor(mut self, predictor: PredictionService) -> Self {
        self.predictor = Some(Arc::new(predictor));
        self.load_error = None;
        self
    }

    pub fn predictor(&self) -> Result<&PredictionService> {
        self.predictor.as_deref().ok_or_else(|| match &self.load_error {
            Some(reason) => AppError::ModelNotLoaded(format!(
                "Model file at {} could not be loaded ({})",
                self.model_path.display(),
                reason
            )),
            None => AppError::ModelNotLoaded(format!(
                "Model file not found at {}",
                self.model_path.display()
            )),
        })
    }

    pub fn model_metadata(&self) -> Option<&ModelMetadata> {
        self.predictor.as_deref().map(PredictionService::metadata)
    }
}
