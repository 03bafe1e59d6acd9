//! Keratoconus severity staging
//!
//! Synthetic corneal tomography data, a Random Forest over five severity
//! stages, evaluation artifacts, and an HTTP prediction service.

pub mod api;
pub mod charts;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod pipeline;

pub use config::Config;
pub use error::{AppError, Result};
