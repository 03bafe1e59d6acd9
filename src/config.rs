use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Artifact locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Synthetic data generation
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Random Forest training
    #[serde(default)]
    pub training: TrainingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: KC__)
            .add_source(
                config::Environment::with_prefix("KC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

/// Locations of every pipeline artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_raw_data")]
    pub raw_data: PathBuf,

    #[serde(default = "default_preprocessed_data")]
    pub preprocessed_data: PathBuf,

    #[serde(default = "default_selected_data")]
    pub selected_data: PathBuf,

    /// Persisted model artifact
    #[serde(default = "default_model")]
    pub model: PathBuf,

    #[serde(default = "default_cv_results")]
    pub cv_results: PathBuf,

    #[serde(default = "default_evaluation_metrics")]
    pub evaluation_metrics: PathBuf,

    #[serde(default = "default_confusion_matrix_plot")]
    pub confusion_matrix_plot: PathBuf,

    #[serde(default = "default_pairplot")]
    pub pairplot: PathBuf,
}

impl PathsConfig {
    /// Lay out every artifact under a single root directory
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let defaults = Self::default();
        Self {
            raw_data: root.join(defaults.raw_data),
            preprocessed_data: root.join(defaults.preprocessed_data),
            selected_data: root.join(defaults.selected_data),
            model: root.join(defaults.model),
            cv_results: root.join(defaults.cv_results),
            evaluation_metrics: root.join(defaults.evaluation_metrics),
            confusion_matrix_plot: root.join(defaults.confusion_matrix_plot),
            pairplot: root.join(defaults.pairplot),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_data: default_raw_data(),
            preprocessed_data: default_preprocessed_data(),
            selected_data: default_selected_data(),
            model: default_model(),
            cv_results: default_cv_results(),
            evaluation_metrics: default_evaluation_metrics(),
            confusion_matrix_plot: default_confusion_matrix_plot(),
            pairplot: default_pairplot(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Samples generated per severity stage
    #[serde(default = "default_n_per_class")]
    pub n_per_class: usize,

    /// RNG seed for sampling and shuffling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            n_per_class: default_n_per_class(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of trees in the forest
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,

    /// Maximum tree depth (unbounded when absent)
    #[serde(default)]
    pub max_depth: Option<u16>,

    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,

    /// Stratified cross-validation folds
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8501
}

fn default_raw_data() -> PathBuf {
    PathBuf::from("data/raw/synthetic_pentacam.csv")
}

fn default_preprocessed_data() -> PathBuf {
    PathBuf::from("data/processed/preprocessed_data.csv")
}

fn default_selected_data() -> PathBuf {
    PathBuf::from("data/processed/selected_features_data.csv")
}

fn default_model() -> PathBuf {
    PathBuf::from("models/rf_kc_severity.bin")
}

fn default_cv_results() -> PathBuf {
    PathBuf::from("models/cv_results.csv")
}

fn default_evaluation_metrics() -> PathBuf {
    PathBuf::from("models/evaluation_metrics.csv")
}

fn default_confusion_matrix_plot() -> PathBuf {
    PathBuf::from("models/confusion_matrix.svg")
}

fn default_pairplot() -> PathBuf {
    PathBuf::from("models/feature_pairplot.svg")
}

fn default_n_per_class() -> usize {
    130
}

fn default_seed() -> u64 {
    42
}

fn default_n_estimators() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_cv_folds() -> usize {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.server.http_port, 8501);
        assert_eq!(config.generator.n_per_class, 130);
        assert_eq!(config.generator.seed, 42);
        assert_eq!(config.training.n_estimators, 100);
        assert_eq!(config.training.cv_folds, 6);
        assert!(config.training.max_depth.is_none());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_embedded_defaults_match_code_defaults() {
        let config: Config = toml_defaults();
        let code = Config::default();
        assert_eq!(config.paths.model, code.paths.model);
        assert_eq!(config.paths.raw_data, code.paths.raw_data);
        assert_eq!(config.training.min_samples_leaf, code.training.min_samples_leaf);
        assert_eq!(config.server.http_port, code.server.http_port);
    }

    #[test]
    fn test_paths_rooted_at() {
        let paths = PathsConfig::rooted_at("/tmp/kc");
        assert_eq!(paths.model, PathBuf::from("/tmp/kc/models/rf_kc_severity.bin"));
        assert_eq!(
            paths.raw_data,
            PathBuf::from("/tmp/kc/data/raw/synthetic_pentacam.csv")
        );
    }

    fn toml_defaults() -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
