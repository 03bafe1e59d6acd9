//! The five pipeline steps
//!
//! Each step reads the previous step's artifact from disk and writes its
//! own, so any step can be re-run on its own once its input exists.

use crate::charts;
use crate::config::{Config, PathsConfig};
use crate::error::Result;
use crate::ml::classifier::{Classifier, RandomForestClassifier, RandomForestParams};
use crate::ml::dataset_io::{read_dataset, write_dataset, write_records};
use crate::ml::evaluation::{
    accuracy, calculate_metrics, classification_report, cross_validate, evaluate_clinical_cases,
    ClinicalCaseResult,
};
use crate::ml::features::{FeatureSelector, Preprocessor};
use crate::ml::generator::SyntheticDataGenerator;
use crate::ml::models::{CrossValidationResult, Dataset, FeatureRange, ModelMetrics};
use crate::models::Severity;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Shape and ranges of a dataset written by a step
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub path: PathBuf,
    pub n_samples: usize,
    pub n_features: usize,
    pub class_counts: BTreeMap<Severity, usize>,
    pub feature_ranges: Vec<(&'static str, FeatureRange)>,
}

impl DatasetSummary {
    fn of(path: &Path, dataset: &Dataset) -> Self {
        Self {
            path: path.to_path_buf(),
            n_samples: dataset.n_samples(),
            n_features: dataset.n_features(),
            class_counts: dataset.class_counts(),
            feature_ranges: dataset.feature_ranges(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionSummary {
    pub dataset: DatasetSummary,
    pub selected_features: Vec<&'static str>,
    /// `None` when the pair plot could not be rendered
    pub pairplot: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub n_samples: usize,
    pub feature_ranges: Vec<(&'static str, FeatureRange)>,
    pub n_folds: usize,
    pub cross_validation: CrossValidationResult,
    pub training_accuracy: f64,
    pub model_path: PathBuf,
    pub cv_results_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub n_samples: usize,
    pub metrics: ModelMetrics,
    pub report: String,
    pub clinical_cases: Vec<ClinicalCaseResult>,
    pub metrics_path: PathBuf,
    /// `None` when the heat-map could not be rendered
    pub confusion_matrix_plot: Option<PathBuf>,
}

/// Row of `cv_results.csv`, percentages
#[derive(Debug, Serialize)]
struct CvResultsRecord<'a> {
    #[serde(rename = "Model")]
    model: &'a str,
    #[serde(rename = "CV_Accuracy")]
    cv_accuracy: f64,
    #[serde(rename = "CV_Std")]
    cv_std: f64,
    #[serde(rename = "Train_Accuracy")]
    train_accuracy: f64,
}

/// Row of `evaluation_metrics.csv`, percentages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRecord {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub f2: f64,
}

impl From<&ModelMetrics> for EvaluationRecord {
    fn from(metrics: &ModelMetrics) -> Self {
        Self {
            accuracy: metrics.accuracy * 100.0,
            precision: metrics.precision * 100.0,
            recall: metrics.recall * 100.0,
            f1: metrics.f1_score * 100.0,
            f2: metrics.f2_score * 100.0,
        }
    }
}

/// Step 1: synthesize the raw dataset
pub fn generate_data(config: &Config) -> Result<DatasetSummary> {
    let generator = SyntheticDataGenerator::from_config(&config.generator);
    let dataset = generator.generate_to(&config.paths.raw_data)?;
    Ok(DatasetSummary::of(&config.paths.raw_data, &dataset))
}

/// Step 2: raw CSV to preprocessed CSV
pub fn preprocess_data(paths: &PathsConfig) -> Result<DatasetSummary> {
    let raw = read_dataset(&paths.raw_data)?;
    info!(rows = raw.n_samples(), "Loaded raw data");

    let processed = Preprocessor::new().transform(&raw)?;
    write_dataset(&paths.preprocessed_data, &processed)?;
    info!(path = %paths.preprocessed_data.display(), "Preprocessed data saved");

    Ok(DatasetSummary::of(&paths.preprocessed_data, &processed))
}

/// Step 3: keep the model columns and draw the pair plot
pub fn select_features(paths: &PathsConfig) -> Result<SelectionSummary> {
    let preprocessed = read_dataset(&paths.preprocessed_data)?;
    let selector = FeatureSelector::new();
    let selected = selector.transform(&preprocessed)?;
    write_dataset(&paths.selected_data, &selected)?;

    let pairplot = charts::feature_pairplot_svg(&selected)
        .and_then(|svg| charts::write_svg(&paths.pairplot, &svg));
    let pairplot = match pairplot {
        Ok(()) => {
            info!(path = %paths.pairplot.display(), "Pair plot saved");
            Some(paths.pairplot.clone())
        }
        Err(e) => {
            warn!(error = %e, "Skipping pair plot");
            None
        }
    };

    Ok(SelectionSummary {
        dataset: DatasetSummary::of(&paths.selected_data, &selected),
        selected_features: selector.selected_features(),
        pairplot,
    })
}

/// Step 4: cross-validate, fit on everything, persist
pub fn train_model(config: &Config) -> Result<TrainingSummary> {
    let paths = &config.paths;
    let dataset = read_dataset(&paths.selected_data)?;
    let params = RandomForestParams::from_config(&config.training);

    let cross_validation = cross_validate(
        &params,
        &dataset,
        config.training.cv_folds,
        config.training.seed,
    )?;
    info!(
        mean = cross_validation.mean_accuracy,
        std = cross_validation.std_accuracy,
        "Cross-validation finished"
    );

    let mut forest = RandomForestClassifier::new(params);
    forest.fit(&dataset)?;
    let training_accuracy = accuracy(&dataset.labels, &forest.predict(&dataset.features)?);
    forest.set_training_accuracy(training_accuracy);
    forest.save(&paths.model)?;

    write_records(
        &paths.cv_results,
        &[CvResultsRecord {
            model: &forest.metadata().name,
            cv_accuracy: cross_validation.mean_accuracy * 100.0,
            cv_std: cross_validation.std_accuracy * 100.0,
            train_accuracy: training_accuracy * 100.0,
        }],
    )?;
    info!(path = %paths.cv_results.display(), "CV results saved");

    Ok(TrainingSummary {
        n_samples: dataset.n_samples(),
        feature_ranges: dataset.feature_ranges(),
        n_folds: config.training.cv_folds,
        cross_validation,
        training_accuracy,
        model_path: paths.model.clone(),
        cv_results_path: paths.cv_results.clone(),
    })
}

/// Step 5: score the persisted model on the raw dataset
pub fn evaluate_model(paths: &PathsConfig) -> Result<EvaluationSummary> {
    let forest = RandomForestClassifier::load(&paths.model)?;
    let dataset = read_dataset(&paths.raw_data)?;

    let predictions = forest.predict(&dataset.features)?;
    let metrics = calculate_metrics(&dataset.labels, &predictions);
    let report = classification_report(&metrics, 4);

    write_records(&paths.evaluation_metrics, &[EvaluationRecord::from(&metrics)])?;
    info!(path = %paths.evaluation_metrics.display(), "Evaluation metrics saved");

    let plot = charts::confusion_matrix_svg(&metrics.confusion_matrix)
        .and_then(|svg| charts::write_svg(&paths.confusion_matrix_plot, &svg));
    let confusion_matrix_plot = match plot {
        Ok(()) => Some(paths.confusion_matrix_plot.clone()),
        Err(e) => {
            warn!(error = %e, "Skipping confusion matrix plot");
            None
        }
    };

    let clinical_cases = evaluate_clinical_cases(&forest)?;

    Ok(EvaluationSummary {
        n_samples: dataset.n_samples(),
        metrics,
        report,
        clinical_cases,
        metrics_path: paths.evaluation_metrics.clone(),
        confusion_matrix_plot,
    })
}
