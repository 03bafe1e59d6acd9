/// Integration tests for the training pipeline
///
/// These tests run every step against a temporary directory and check
/// the artifacts each one leaves behind.

use kc_severity::{
    config::{Config, PathsConfig},
    ml::{read_dataset, Classifier, PredictionService, RandomForestClassifier},
    models::{CornealMeasurement, Severity},
    pipeline::{Pipeline, PipelineStep, StepOutput, StepStatus},
};
use std::fs;
use tempfile::TempDir;

fn small_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths = PathsConfig::rooted_at(dir.path());
    config.generator.n_per_class = 40;
    config.generator.seed = 42;
    config.training.n_estimators = 10;
    config.training.cv_folds = 3;
    config.training.seed = 42;
    config
}

fn first_line(path: &std::path::Path) -> String {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .next()
        .unwrap_or_default()
        .to_string()
}

#[test]
fn test_full_pipeline_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(&dir);
    let paths = config.paths.clone();

    let mut steps_seen = Vec::new();
    let report = Pipeline::new(config).run_with(|outcome| steps_seen.push(outcome.step));

    assert!(report.succeeded(), "failed step: {:?}", report.failed_step());
    assert_eq!(steps_seen, PipelineStep::all().to_vec());
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Passed));

    for path in [
        &paths.raw_data,
        &paths.preprocessed_data,
        &paths.selected_data,
        &paths.model,
        &paths.cv_results,
        &paths.evaluation_metrics,
        &paths.confusion_matrix_plot,
        &paths.pairplot,
    ] {
        assert!(path.exists(), "missing artifact {}", path.display());
    }

    assert_eq!(first_line(&paths.raw_data), "Severity,Rm_B,Rm_F,Pachy_Min");
    assert_eq!(
        first_line(&paths.cv_results),
        "Model,CV_Accuracy,CV_Std,Train_Accuracy"
    );
    assert_eq!(
        first_line(&paths.evaluation_metrics),
        "accuracy,precision,recall,f1,f2"
    );

    let svg = fs::read_to_string(&paths.confusion_matrix_plot).unwrap();
    assert!(svg.starts_with("<svg"));
}

#[test]
fn test_pipeline_outputs_are_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(&dir);
    let report = Pipeline::new(config).run();
    assert!(report.succeeded());

    let generated = match &report.steps[0].output {
        Some(StepOutput::Generated(summary)) => summary.clone(),
        other => panic!("unexpected output {:?}", other),
    };
    assert_eq!(generated.n_samples, 200);
    assert_eq!(generated.class_counts.len(), 5);
    assert!(generated.class_counts.values().all(|&n| n == 40));

    match &report.steps[3].output {
        Some(StepOutput::Trained(summary)) => {
            assert_eq!(summary.n_folds, 3);
            assert_eq!(summary.cross_validation.fold_accuracies.len(), 3);
            assert!(summary.training_accuracy > 0.5);
            assert!(summary.cross_validation.mean_accuracy > 0.3);
        }
        other => panic!("unexpected output {:?}", other),
    }

    match &report.steps[4].output {
        Some(StepOutput::Evaluated(summary)) => {
            assert_eq!(summary.n_samples, 200);
            assert_eq!(summary.clinical_cases.len(), 5);
            assert_eq!(summary.metrics.confusion_matrix.dim(), (5, 5));
            let total: usize = summary.metrics.confusion_matrix.iter().sum();
            assert_eq!(total, 200);
            assert!(summary.report.contains("weighted avg"));
        }
        other => panic!("unexpected output {:?}", other),
    }
}

#[test]
fn test_pipeline_is_deterministic() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let config_a = small_config(&first);
    let config_b = small_config(&second);
    assert!(Pipeline::new(config_a.clone()).run().succeeded());
    assert!(Pipeline::new(config_b.clone()).run().succeeded());

    assert_eq!(
        read_dataset(&config_a.paths.raw_data).unwrap(),
        read_dataset(&config_b.paths.raw_data).unwrap()
    );
    assert_eq!(
        fs::read_to_string(&config_a.paths.cv_results).unwrap(),
        fs::read_to_string(&config_b.paths.cv_results).unwrap()
    );
}

#[test]
fn test_trained_model_serves_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(&dir);
    assert!(Pipeline::new(config.clone()).run().succeeded());

    let model = RandomForestClassifier::load(&config.paths.model).unwrap();
    assert!(model.is_trained());
    assert_eq!(model.n_trees(), 10);

    let service = PredictionService::load(&config.paths.model).unwrap();
    let normal = service
        .predict(&CornealMeasurement::new(6.5, 7.8, 540.0), "test")
        .unwrap();
    assert_eq!(normal.stage, Severity::Normal);
    assert!((normal.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);

    let severe = service
        .predict(&CornealMeasurement::new(4.7, 6.2, 380.0), "test")
        .unwrap();
    assert_eq!(severe.stage, Severity::Severe);
}

#[test]
fn test_steps_run_individually() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(&dir);
    let pipeline = Pipeline::new(config);

    // Training needs the selected dataset
    let err = pipeline.run_step(PipelineStep::Training).unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");

    for step in PipelineStep::all() {
        pipeline.run_step(step).unwrap();
    }
    assert!(pipeline.config().paths.model.exists());
}
