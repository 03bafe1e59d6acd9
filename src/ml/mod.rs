/// Machine learning for keratoconus severity staging
///
/// This module provides:
/// - Synthetic Pentacam dataset generation
/// - CSV dataset persistence
/// - Preprocessing and feature selection
/// - A bagged Random Forest with vote-fraction probabilities
/// - Metrics, classification reports and stratified cross-validation
/// - A shared read-only prediction service

pub mod classifier;
pub mod dataset_io;
pub mod evaluation;
pub mod features;
pub mod generator;
pub mod models;
pub mod service;

pub use classifier::{Classifier, RandomForestClassifier, RandomForestParams};
pub use dataset_io::{read_dataset, write_dataset, write_records};
pub use evaluation::{
    calculate_metrics, classification_report, clinical_cases, cross_validate,
    evaluate_clinical_cases, stratified_folds, ClinicalCase, ClinicalCaseResult,
};
pub use features::{FeatureSelector, Preprocessor};
pub use generator::{StageDistribution, SyntheticDataGenerator};
pub use models::{
    ClassMetrics, CrossValidationResult, Dataset, FeatureRange, LabeledSample, ModelMetadata,
    ModelMetrics, Prediction,
};
pub use service::PredictionService;
