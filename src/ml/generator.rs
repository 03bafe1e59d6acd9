//! Synthetic Pentacam data generation
//!
//! Each severity stage draws its three measurements from independent
//! Gaussians whose means drift with the stage: the cornea thins and both
//! surfaces steepen as keratoconus progresses.

use crate::config::GeneratorConfig;
use crate::error::{AppError, Result};
use crate::ml::dataset_io;
use crate::ml::models::{Dataset, LabeledSample};
use crate::models::{CornealMeasurement, Severity};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::path::Path;
use tracing::info;

/// Mean and standard deviation of one feature for one stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianParams {
    pub mean: f64,
    pub std_dev: f64,
}

/// Distribution parameters of all three features for a stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageDistribution {
    pub rm_b: GaussianParams,
    pub rm_f: GaussianParams,
    pub pachy_min: GaussianParams,
}

impl StageDistribution {
    pub fn for_stage(stage: Severity) -> Self {
        let s = stage.index() as f64;
        Self {
            rm_b: GaussianParams {
                mean: 6.5 - s * 0.4,
                std_dev: 0.25,
            },
            rm_f: GaussianParams {
                mean: 7.8 - s * 0.35,
                std_dev: 0.3,
            },
            pachy_min: GaussianParams {
                mean: 520.0 - s * 30.0,
                std_dev: 20.0,
            },
        }
    }
}

pub struct SyntheticDataGenerator {
    n_per_class: usize,
    seed: u64,
}

impl SyntheticDataGenerator {
    pub fn new(n_per_class: usize, seed: u64) -> Self {
        Self { n_per_class, seed }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.n_per_class, config.seed)
    }

    pub fn n_per_class(&self) -> usize {
        self.n_per_class
    }

    /// Generate all stages in order, then shuffle the rows
    ///
    /// Same `n_per_class` and seed always yield the same dataset.
    pub fn generate(&self) -> Result<Dataset> {
        if self.n_per_class == 0 {
            return Err(AppError::Validation(
                "n_per_class must be at least 1".to_string(),
            ));
        }

        info!(
            n_per_class = self.n_per_class,
            seed = self.seed,
            "Generating synthetic Pentacam dataset"
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut samples = Vec::with_capacity(self.n_per_class * Severity::all().len());

        for stage in Severity::all() {
            info!(stage = stage.index(), "Generating stage data");
            samples.extend(self.generate_stage(stage, &mut rng)?);
        }

        samples.shuffle(&mut rng);

        Ok(Dataset::from_samples(&samples))
    }

    /// Generate and persist to CSV
    pub fn generate_to(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let dataset = self.generate()?;
        dataset_io::write_dataset(path.as_ref(), &dataset)?;
        info!(path = %path.as_ref().display(), rows = dataset.n_samples(), "Dataset saved");
        Ok(dataset)
    }

    fn generate_stage(&self, stage: Severity, rng: &mut ChaCha8Rng) -> Result<Vec<LabeledSample>> {
        let params = StageDistribution::for_stage(stage);
        let rm_b = normal(params.rm_b)?;
        let rm_f = normal(params.rm_f)?;
        let pachy_min = normal(params.pachy_min)?;

        // Column-at-a-time sampling: all Rm_B, then all Rm_F, then all Pachy_Min
        let rm_b_values: Vec<f64> = (0..self.n_per_class).map(|_| rm_b.sample(rng)).collect();
        let rm_f_values: Vec<f64> = (0..self.n_per_class).map(|_| rm_f.sample(rng)).collect();
        let pachy_values: Vec<f64> = (0..self.n_per_class)
            .map(|_| pachy_min.sample(rng))
            .collect();

        Ok(rm_b_values
            .into_iter()
            .zip(rm_f_values)
            .zip(pachy_values)
            .map(|((b, f), p)| LabeledSample::new(stage, CornealMeasurement::new(b, f, p)))
            .collect())
    }
}

impl Default for SyntheticDataGenerator {
    fn default() -> Self {
        Self::from_config(&GeneratorConfig::default())
    }
}

fn normal(params: GaussianParams) -> Result<Normal<f64>> {
    Normal::new(params.mean, params.std_dev)
        .map_err(|e| AppError::Internal(format!("invalid Gaussian parameters: {}", e)))
}
