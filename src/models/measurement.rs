use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Feature column names in model input order
pub const FEATURE_NAMES: [&str; 3] = ["Rm_B", "Rm_F", "Pachy_Min"];

/// Label column name
pub const LABEL_COLUMN: &str = "Severity";

/// Number of model input features
pub const N_FEATURES: usize = FEATURE_NAMES.len();

/// Three corneal tomography measurements
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CornealMeasurement {
    /// Posterior radius of curvature (mm)
    #[serde(rename = "Rm_B")]
    pub rm_b: f64,

    /// Anterior radius of curvature (mm)
    #[serde(rename = "Rm_F")]
    pub rm_f: f64,

    /// Thinnest pachymetry (µm)
    #[serde(rename = "Pachy_Min")]
    pub pachy_min: f64,
}

impl CornealMeasurement {
    pub fn new(rm_b: f64, rm_f: f64, pachy_min: f64) -> Self {
        Self {
            rm_b,
            rm_f,
            pachy_min,
        }
    }

    /// Feature vector in `FEATURE_NAMES` order
    pub fn to_features(&self) -> [f64; N_FEATURES] {
        [self.rm_b, self.rm_f, self.pachy_min]
    }

    pub fn from_features(features: &[f64]) -> Result<Self> {
        match features {
            [rm_b, rm_f, pachy_min] => Ok(Self::new(*rm_b, *rm_f, *pachy_min)),
            _ => Err(AppError::Validation(format!(
                "expected {} features, got {}",
                N_FEATURES,
                features.len()
            ))),
        }
    }

    /// Reject NaN and infinite values
    pub fn ensure_finite(&self) -> Result<()> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_features()) {
            if !value.is_finite() {
                return Err(AppError::Validation(format!(
                    "{} must be a finite number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
