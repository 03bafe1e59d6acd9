use crate::config::TrainingConfig;
use crate::error::{AppError, Result};
use crate::ml::dataset_io::ensure_parent_dir;
use crate::ml::models::{argmax, Dataset, ModelMetadata, Prediction};
use crate::models::{CornealMeasurement, Severity, N_FEATURES, N_STAGES};
use bincode::Options;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Trait for severity classifiers
pub trait Classifier: Send + Sync {
    /// Fit the classifier to a labeled dataset
    fn fit(&mut self, dataset: &Dataset) -> Result<()>;

    /// Predict stage labels
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Severity>>;

    /// Predict class probabilities (n_samples × 5)
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Random Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    /// Unbounded when `None`
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Seed for bootstrap resampling
    pub seed: u64,
}

impl RandomForestParams {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            seed: config.seed,
        }
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(AppError::Validation(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(AppError::Validation(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(AppError::Validation(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn tree_parameters(&self) -> DecisionTreeClassifierParameters {
        let params = DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf);

        match self.max_depth {
            Some(depth) => params.with_max_depth(depth),
            None => params,
        }
    }

    fn as_map(&self) -> HashMap<String, String> {
        [
            ("n_estimators", self.n_estimators.to_string()),
            (
                "max_depth",
                self.max_depth
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "None".to_string()),
            ),
            ("min_samples_split", self.min_samples_split.to_string()),
            ("min_samples_leaf", self.min_samples_leaf.to_string()),
            ("criterion", "gini".to_string()),
            // Every split considers all features
            ("max_features", N_FEATURES.to_string()),
            ("seed", self.seed.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

/// Bagged ensemble of CART trees with vote-fraction probabilities
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    /// Model metadata
    metadata: ModelMetadata,

    /// Hyperparameters
    params: RandomForestParams,

    /// Fitted trees, empty until trained
    trees: Vec<Tree>,
}

impl RandomForestClassifier {
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            metadata: ModelMetadata {
                name: "Random Forest (bagged trees)".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                trained_at: chrono::Utc::now(),
                n_training_samples: 0,
                n_features: N_FEATURES,
                training_accuracy: 0.0,
                hyperparameters: params.as_map(),
            },
            params,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub(crate) fn set_training_accuracy(&mut self, accuracy: f64) {
        self.metadata.training_accuracy = accuracy;
    }

    fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
        let shape = arr.shape();
        let data: Vec<f64> = arr.iter().copied().collect();
        DenseMatrix::new(shape[0], shape[1], data, false)
    }

    fn severities_to_labels(labels: &[Severity]) -> Vec<i32> {
        labels.iter().map(|s| s.index() as i32).collect()
    }

    /// Bootstrap row indices per tree, drawn sequentially from one seeded RNG
    fn bootstrap_samples(&self, n_samples: usize) -> Vec<Vec<usize>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        (0..self.params.n_estimators)
            .map(|_| (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect())
            .collect()
    }

    fn check_input(&self, features: &Array2<f64>) -> Result<()> {
        if !self.is_trained() {
            return Err(AppError::ModelNotLoaded("Model not trained".to_string()));
        }
        if features.ncols() != N_FEATURES {
            return Err(AppError::Validation(format!(
                "expected {} feature columns, got {}",
                N_FEATURES,
                features.ncols()
            )));
        }
        Ok(())
    }

    /// Predict a single measurement
    pub fn predict_measurement(&self, measurement: &CornealMeasurement) -> Result<Prediction> {
        measurement.ensure_finite()?;
        let features = Array2::from_shape_vec((1, N_FEATURES), measurement.to_features().to_vec())
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))?;

        let proba = self.predict_proba(&features)?;
        let mut row = [0.0; N_STAGES];
        for (slot, &p) in row.iter_mut().zip(proba.row(0).iter()) {
            *slot = p;
        }
        Ok(Prediction::from_probabilities(row))
    }

    /// Persist the fitted model with bincode
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !self.is_trained() {
            return Err(AppError::ModelNotLoaded(
                "refusing to save an untrained model".to_string(),
            ));
        }
        ensure_parent_dir(path)?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;

        info!(path = %path.display(), trees = self.trees.len(), "Model saved");
        Ok(())
    }

    /// Load a model persisted by [`RandomForestClassifier::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AppError::NotFound(format!("model file {}", path.display())));
        }

        // Reads are capped at the file size
        let file_len = fs::metadata(path)?.len();
        let file = File::open(path)?;
        let model: Self = bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(file_len)
            .deserialize_from(BufReader::new(file))?;
        if !model.is_trained() {
            return Err(AppError::Serialization(format!(
                "model file {} contains no trees",
                path.display()
            )));
        }

        info!(path = %path.display(), trees = model.trees.len(), "Model loaded");
        Ok(model)
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, dataset: &Dataset) -> Result<()> {
        self.params.validate()?;
        if dataset.is_empty() {
            return Err(AppError::Training(
                "cannot fit on an empty dataset".to_string(),
            ));
        }
        if dataset.n_features() != N_FEATURES {
            return Err(AppError::Validation(format!(
                "expected {} feature columns, got {}",
                N_FEATURES,
                dataset.n_features()
            )));
        }

        let bootstraps = self.bootstrap_samples(dataset.n_samples());
        let tree_params = self.params.tree_parameters();

        debug!(
            n_estimators = self.params.n_estimators,
            n_samples = dataset.n_samples(),
            "Fitting forest"
        );

        let trees = bootstraps
            .par_iter()
            .map(|rows| {
                let sample = dataset.subset(rows);
                let x = Self::ndarray_to_densematrix(&sample.features);
                let y = Self::severities_to_labels(&sample.labels);
                Tree::fit(&x, &y, tree_params.clone())
                    .map_err(|e| AppError::Training(format!("Failed to train decision tree: {}", e)))
            })
            .collect::<Result<Vec<Tree>>>()?;

        self.trees = trees;
        self.metadata.n_training_samples = dataset.n_samples();
        self.metadata.n_features = dataset.n_features();
        self.metadata.trained_at = chrono::Utc::now();

        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<Severity>> {
        let proba = self.predict_proba(features)?;
        proba
            .rows()
            .into_iter()
            .map(|row| {
                let values: Vec<f64> = row.iter().copied().collect();
                Severity::from_index(argmax(&values))
            })
            .collect()
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_input(features)?;

        let x = Self::ndarray_to_densematrix(features);
        let votes = self
            .trees
            .par_iter()
            .map(|tree| {
                tree.predict(&x)
                    .map_err(|e| AppError::Prediction(format!("Prediction failed: {}", e)))
            })
            .collect::<Result<Vec<Vec<i32>>>>()?;

        let n_samples = features.nrows();
        let mut proba = Array2::zeros((n_samples, N_STAGES));
        for tree_votes in &votes {
            for (i, &label) in tree_votes.iter().enumerate() {
                let stage = usize::try_from(label)
                    .ok()
                    .filter(|&s| s < N_STAGES)
                    .ok_or_else(|| {
                        AppError::Prediction(format!("tree produced unknown label {}", label))
                    })?;
                proba[[i, stage]] += 1.0;
            }
        }

        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }
}
