use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Number of severity stages
pub const N_STAGES: usize = 5;

/// Keratoconus severity stage (0 = normal cornea, 4 = severe KC)
///
/// Stored on disk and over the wire as its integer index.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    #[strum(serialize = "Stage 0")]
    Normal,
    #[strum(serialize = "Stage 1")]
    Mild,
    #[strum(serialize = "Stage 2")]
    Moderate,
    #[strum(serialize = "Stage 3")]
    Advanced,
    #[strum(serialize = "Stage 4")]
    Severe,
}

/// Display information for a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Foreground colour
    pub color: &'static str,
    /// Background colour for result boxes and gauge bands
    pub background: &'static str,
    pub css_class: &'static str,
    pub recommendation: &'static str,
}

impl Severity {
    /// Numeric stage index (0-4)
    pub fn index(&self) -> usize {
        match self {
            Severity::Normal => 0,
            Severity::Mild => 1,
            Severity::Moderate => 2,
            Severity::Advanced => 3,
            Severity::Severe => 4,
        }
    }

    /// Parse a stage index, rejecting anything outside 0-4
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Severity::Normal),
            1 => Ok(Severity::Mild),
            2 => Ok(Severity::Moderate),
            3 => Ok(Severity::Advanced),
            4 => Ok(Severity::Severe),
            other => Err(AppError::Validation(format!(
                "severity stage must be in 0..=4, got {}",
                other
            ))),
        }
    }

    /// All stages in index order
    pub fn all() -> Vec<Severity> {
        Severity::iter().collect()
    }

    pub fn info(&self) -> StageInfo {
        match self {
            Severity::Normal => StageInfo {
                name: "Stage 0 - Normal",
                description: "Clear cornea with normal thickness and visual acuity",
                color: "#28a745",
                background: "#d4edda",
                css_class: "stage-0",
                recommendation: "Normal cornea. Regular follow-up recommended.",
            },
            Severity::Mild => StageInfo {
                name: "Stage 1 - Mild KC",
                description: "Fleischer's ring may be present, mild corneal thinning",
                color: "#17a2b8",
                background: "#d1ecf1",
                css_class: "stage-1",
                recommendation: "Mild KC. Consider corneal cross-linking consultation. \
                                 Spectacles or soft contact lenses.",
            },
            Severity::Moderate => StageInfo {
                name: "Stage 2 - Moderate KC",
                description: "Fleischer's ring and Vogt's striae, evident thinning",
                color: "#ffc107",
                background: "#fff3cd",
                css_class: "stage-2",
                recommendation: "Moderate KC. Corneal cross-linking recommended. \
                                 Rigid contact lenses may be needed.",
            },
            Severity::Advanced => StageInfo {
                name: "Stage 3 - Advanced KC",
                description: "Munson's sign, significant thinning with faint scarring",
                color: "#fd7e14",
                background: "#f8d7da",
                css_class: "stage-3",
                recommendation: "Advanced KC. Corneal cross-linking and specialty contact \
                                 lenses. Consider surgical options.",
            },
            Severity::Severe => StageInfo {
                name: "Stage 4 - Severe KC",
                description: "Corneal scarring and opacities, evident Munson's sign",
                color: "#dc3545",
                background: "#f5c6cb",
                css_class: "stage-4",
                recommendation: "Severe KC. Surgical intervention likely required \
                                 (corneal ring implant or transplant).",
            },
        }
    }

    /// Stage info for an arbitrary index, falling back to Stage 0
    pub fn info_for_index(index: usize) -> StageInfo {
        Severity::from_index(index)
            .unwrap_or(Severity::Normal)
            .info()
    }
}

impl TryFrom<u8> for Severity {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self> {
        Severity::from_index(value as usize)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.index() as u8
    }
}
