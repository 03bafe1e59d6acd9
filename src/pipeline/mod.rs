/// End-to-end training pipeline
///
/// Runs data generation, preprocessing, feature selection, training and
/// evaluation in that fixed order, timing each step and halting on the
/// first failure.

pub mod steps;

pub use steps::{
    evaluate_model, generate_data, preprocess_data, select_features, train_model,
    DatasetSummary, EvaluationRecord, EvaluationSummary, SelectionSummary, TrainingSummary,
};

use crate::config::Config;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

/// Pipeline steps in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStep {
    DataGeneration,
    Preprocessing,
    FeatureSelection,
    Training,
    Evaluation,
}

impl PipelineStep {
    pub fn all() -> [PipelineStep; 5] {
        [
            PipelineStep::DataGeneration,
            PipelineStep::Preprocessing,
            PipelineStep::FeatureSelection,
            PipelineStep::Training,
            PipelineStep::Evaluation,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStep::DataGeneration => "1. Data Generation",
            PipelineStep::Preprocessing => "2. Data Preprocessing",
            PipelineStep::FeatureSelection => "3. Feature Selection",
            PipelineStep::Training => "4. Model Training",
            PipelineStep::Evaluation => "5. Model Evaluation",
        }
    }
}

/// What a step produced
#[derive(Debug, Clone)]
pub enum StepOutput {
    Generated(DatasetSummary),
    Preprocessed(DatasetSummary),
    Selected(SelectionSummary),
    Trained(TrainingSummary),
    Evaluated(EvaluationSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Passed,
    Failed,
}

/// Result of running one step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: PipelineStep,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub output: Option<StepOutput>,
    pub error: Option<String>,
}

/// Result of a full pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    pub total_duration: Duration,
}

impl PipelineReport {
    /// True when every step ran and passed
    pub fn succeeded(&self) -> bool {
        self.steps.len() == PipelineStep::all().len()
            && self.steps.iter().all(|s| s.status == StepStatus::Passed)
    }

    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    /// Total time divided by the number of steps run
    pub fn average_step_duration(&self) -> Duration {
        match u32::try_from(self.steps.len()) {
            Ok(n) if n > 0 => self.total_duration / n,
            _ => Duration::ZERO,
        }
    }
}

/// Pipeline runner over one configuration
pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a single step
    pub fn run_step(&self, step: PipelineStep) -> Result<StepOutput> {
        let paths = &self.config.paths;
        match step {
            PipelineStep::DataGeneration => generate_data(&self.config).map(StepOutput::Generated),
            PipelineStep::Preprocessing => preprocess_data(paths).map(StepOutput::Preprocessed),
            PipelineStep::FeatureSelection => select_features(paths).map(StepOutput::Selected),
            PipelineStep::Training => train_model(&self.config).map(StepOutput::Trained),
            PipelineStep::Evaluation => evaluate_model(paths).map(StepOutput::Evaluated),
        }
    }

    /// Run every step in order
    pub fn run(&self) -> PipelineReport {
        self.run_with(|_| {})
    }

    /// Run every step in order, handing each outcome to `observer` as it completes
    pub fn run_with<F>(&self, mut observer: F) -> PipelineReport
    where
        F: FnMut(&StepOutcome),
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let pipeline_start = Instant::now();
        let mut outcomes = Vec::with_capacity(PipelineStep::all().len());

        info!(run_id = %run_id, "Starting pipeline");

        for step in PipelineStep::all() {
            info!(run_id = %run_id, step = step.name(), "Executing step");

            let step_started_at = Utc::now();
            let step_start = Instant::now();
            let result = self.run_step(step);
            let duration = step_start.elapsed();

            let outcome = match result {
                Ok(output) => {
                    info!(
                        run_id = %run_id,
                        step = step.name(),
                        elapsed_secs = duration.as_secs_f64(),
                        "Step completed"
                    );
                    StepOutcome {
                        step,
                        status: StepStatus::Passed,
                        started_at: step_started_at,
                        duration,
                        output: Some(output),
                        error: None,
                    }
                }
                Err(e) => {
                    error!(run_id = %run_id, step = step.name(), error = %e, "Step failed");
                    StepOutcome {
                        step,
                        status: StepStatus::Failed,
                        started_at: step_started_at,
                        duration,
                        output: None,
                        error: Some(e.to_string()),
                    }
                }
            };

            observer(&outcome);
            let failed = outcome.status == StepStatus::Failed;
            outcomes.push(outcome);

            if failed {
                error!(run_id = %run_id, "Pipeline execution halted");
                break;
            }
        }

        let report = PipelineReport {
            run_id,
            started_at,
            steps: outcomes,
            total_duration: pipeline_start.elapsed(),
        };

        if report.succeeded() {
            info!(
                run_id = %run_id,
                total_secs = report.total_duration.as_secs_f64(),
                "Pipeline completed successfully"
            );
        }
        report
    }
}
