use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kc_severity::config::Config;
use kc_severity::logging::init_tracing;
use kc_severity::ml::evaluation::format_confusion_matrix;
use kc_severity::ml::{FeatureRange, PredictionService};
use kc_severity::models::{CornealMeasurement, Severity};
use kc_severity::pipeline::{
    DatasetSummary, EvaluationSummary, Pipeline, PipelineReport, PipelineStep, SelectionSummary,
    StepOutcome, StepOutput, StepStatus, TrainingSummary,
};
use reqwest::Client;
use serde_json::json;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kc-pipeline")]
#[command(about = "Keratoconus severity staging pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all five steps in order
    Run,

    /// Step 1: generate the synthetic raw dataset
    Generate,

    /// Step 2: preprocess the raw dataset
    Preprocess,

    /// Step 3: select model features and draw the pair plot
    Select,

    /// Step 4: cross-validate and train the Random Forest
    Train,

    /// Step 5: evaluate the trained model
    Evaluate,

    /// Predict the severity stage of one eye
    Predict {
        /// Posterior radius of curvature (mm)
        #[arg(long)]
        rm_b: f64,

        /// Anterior radius of curvature (mm)
        #[arg(long)]
        rm_f: f64,

        /// Thinnest pachymetry (µm)
        #[arg(long)]
        pachy_min: f64,

        /// Ask a running server instead of loading the model locally
        #[arg(short, long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.observability);

    let step = match cli.command {
        Commands::Run => return Ok(run_pipeline(config)),
        Commands::Generate => PipelineStep::DataGeneration,
        Commands::Preprocess => PipelineStep::Preprocessing,
        Commands::Select => PipelineStep::FeatureSelection,
        Commands::Train => PipelineStep::Training,
        Commands::Evaluate => PipelineStep::Evaluation,
        Commands::Predict {
            rm_b,
            rm_f,
            pachy_min,
            endpoint,
        } => {
            let measurement = CornealMeasurement::new(rm_b, rm_f, pachy_min);
            match endpoint {
                Some(endpoint) => predict_remote(&endpoint, &measurement).await?,
                None => predict_local(&config, &measurement)?,
            }
            return Ok(ExitCode::SUCCESS);
        }
    };

    println!("{}", step.name());
    println!("{}", "=".repeat(60));
    let output = Pipeline::new(config).run_step(step)?;
    print_output(&output);
    Ok(ExitCode::SUCCESS)
}

fn run_pipeline(config: Config) -> ExitCode {
    println!("{}", "=".repeat(60));
    println!("KERATOCONUS SEVERITY STAGING PIPELINE");
    println!("{}", "=".repeat(60));

    let pipeline = Pipeline::new(config);
    let report = pipeline.run_with(|outcome| {
        println!();
        println!("{}", "=".repeat(60));
        println!("{}", outcome.step.name());
        println!("{}", "=".repeat(60));
        print_outcome(outcome);
    });

    print_summary(&report);
    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_outcome(outcome: &StepOutcome) {
    match (&outcome.output, &outcome.error) {
        (Some(output), _) => {
            print_output(output);
            println!(
                "✓ {} completed in {:.2}s",
                outcome.step.name(),
                outcome.duration.as_secs_f64()
            );
        }
        (None, error) => {
            println!(
                "✗ {} failed: {}",
                outcome.step.name(),
                error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

fn print_summary(report: &PipelineReport) {
    println!();
    println!("{}", "=".repeat(60));
    println!("PIPELINE SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Run ID: {}", report.run_id);
    for outcome in &report.steps {
        let label = match outcome.status {
            StepStatus::Passed => "✓ PASSED",
            StepStatus::Failed => "✗ FAILED",
        };
        println!("{:<25} {}", outcome.step.name(), label);
    }

    if let Some(failed) = report.failed_step() {
        println!();
        println!("Pipeline halted at {}", failed.step.name());
        return;
    }

    println!();
    println!(
        "Total execution time: {:.2}s",
        report.total_duration.as_secs_f64()
    );
    println!(
        "Average time per step: {:.2}s",
        report.average_step_duration().as_secs_f64()
    );
    println!();
    println!("Next steps:");
    println!("  1. Review the artifacts under models/");
    println!("  2. Check the cross-validation results: models/cv_results.csv");
    println!("  3. Start the web app: kc-severity");
}

fn print_output(output: &StepOutput) {
    match output {
        StepOutput::Generated(summary) => {
            println!("Generated {} samples", summary.n_samples);
            print_dataset(summary);
        }
        StepOutput::Preprocessed(summary) => {
            println!("Preprocessed {} samples", summary.n_samples);
            print_dataset(summary);
        }
        StepOutput::Selected(summary) => print_selection(summary),
        StepOutput::Trained(summary) => print_training(summary),
        StepOutput::Evaluated(summary) => print_evaluation(summary),
    }
}

fn print_dataset(summary: &DatasetSummary) {
    println!("Saved: {}", summary.path.display());
    println!(
        "Shape: {} rows x {} features",
        summary.n_samples, summary.n_features
    );
    println!("Class distribution:");
    for (stage, count) in &summary.class_counts {
        println!("  {}: {}", stage, count);
    }
    print_ranges(&summary.feature_ranges);
}

fn print_ranges(ranges: &[(&'static str, FeatureRange)]) {
    println!("Feature ranges:");
    for (name, range) in ranges {
        let decimals = if *name == "Pachy_Min" { 0 } else { 2 };
        println!(
            "  {:<10} {:.*} - {:.*}",
            name, decimals, range.min, decimals, range.max
        );
    }
}

fn print_selection(summary: &SelectionSummary) {
    println!("Selected features: {}", summary.selected_features.join(", "));
    println!("Saved: {}", summary.dataset.path.display());
    match &summary.pairplot {
        Some(path) => println!("Pair plot: {}", path.display()),
        None => println!("Pair plot: skipped"),
    }
}

fn print_training(summary: &TrainingSummary) {
    println!("Training samples: {}", summary.n_samples);
    print_ranges(&summary.feature_ranges);
    println!();
    println!("{}-fold cross-validation:", summary.n_folds);
    for (i, acc) in summary.cross_validation.fold_accuracies.iter().enumerate() {
        println!("  Fold {}: {:.2}%", i + 1, acc * 100.0);
    }
    println!(
        "  Mean: {:.2}% (+/- {:.2}%)",
        summary.cross_validation.mean_accuracy * 100.0,
        summary.cross_validation.std_accuracy * 100.0
    );
    println!("Training accuracy: {:.2}%", summary.training_accuracy * 100.0);
    println!("Model saved: {}", summary.model_path.display());
    println!("CV results saved: {}", summary.cv_results_path.display());
}

fn print_evaluation(summary: &EvaluationSummary) {
    let metrics = &summary.metrics;
    println!("Evaluated on {} samples", summary.n_samples);
    println!();
    println!("Classification report:");
    println!("{}", summary.report);
    println!("Confusion matrix:");
    println!("{}", format_confusion_matrix(&metrics.confusion_matrix));
    println!("Accuracy:  {:.2}%", metrics.accuracy * 100.0);
    println!("Precision: {:.2}%", metrics.precision * 100.0);
    println!("Recall:    {:.2}%", metrics.recall * 100.0);
    println!("F1 score:  {:.2}%", metrics.f1_score * 100.0);
    println!("F2 score:  {:.2}%", metrics.f2_score * 100.0);
    println!("Metrics saved: {}", summary.metrics_path.display());
    if let Some(path) = &summary.confusion_matrix_plot {
        println!("Confusion matrix plot: {}", path.display());
    }

    println!();
    println!("Clinical validation:");
    for result in &summary.clinical_cases {
        let mark = if result.passed() { "✓" } else { "✗" };
        println!(
            "  {} {:<28} expected {}, predicted {} ({:.1}% confidence)",
            mark,
            result.case.name,
            result.case.expected,
            result.prediction.stage,
            result.prediction.confidence * 100.0
        );
    }
}

fn predict_local(config: &Config, measurement: &CornealMeasurement) -> anyhow::Result<()> {
    let service = PredictionService::load(&config.paths.model)
        .with_context(|| "run `kc-pipeline run` to train a model first")?;
    let prediction = service.predict(measurement, "cli")?;

    let info = prediction.stage.info();
    println!("{}", info.name);
    println!("{}", info.description);
    println!("Recommendation: {}", info.recommendation);
    println!("Confidence: {:.1}%", prediction.confidence * 100.0);
    println!("Probabilities:");
    for stage in Severity::all() {
        println!(
            "  {}: {:.1}%",
            stage,
            prediction.probabilities[stage.index()] * 100.0
        );
    }
    Ok(())
}

async fn predict_remote(endpoint: &str, measurement: &CornealMeasurement) -> anyhow::Result<()> {
    let client = Client::new();
    let response = client
        .post(format!("{}/v1/predict", endpoint.trim_end_matches('/')))
        .json(&json!({
            "rm_b": measurement.rm_b,
            "rm_f": measurement.rm_f,
            "pachy_min": measurement.pachy_min,
        }))
        .send()
        .await?;

    let status = response.status();
    let body: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        bail!("server returned {}", status);
    }
    Ok(())
}
