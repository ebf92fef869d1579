//! Configuration module

use std::env;

use billing_core::{MaxFeatures, TrainingConfig, VocabularyPolicy};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server port
    pub port: u16,

    /// Training dataset (CSV)
    pub dataset_path: String,

    /// Number of trees in the forest
    pub n_estimators: usize,

    /// Seed for bootstrap sampling and the holdout split
    pub random_seed: u64,

    /// Maximum tree depth (unbounded when unset)
    pub max_depth: Option<usize>,

    /// Features considered per split: all, sqrt, or a fraction
    pub max_features: MaxFeatures,

    /// Share of rows held out for evaluation at startup (0 disables)
    pub holdout_fraction: f64,

    /// Handling of categories never seen during training
    pub vocabulary_policy: VocabularyPolicy,

    /// Environment (development, production)
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://predictions.db?mode=rwc".to_string(),
            port: 8080,
            dataset_path: "healthcare_dataset.csv".to_string(),
            n_estimators: 100,
            random_seed: 42,
            max_depth: None,
            max_features: MaxFeatures::All,
            holdout_fraction: 0.0,
            vocabulary_policy: VocabularyPolicy::Warn,
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),

            port: parse_var("PORT").unwrap_or(defaults.port),

            dataset_path: env::var("DATASET_PATH").unwrap_or(defaults.dataset_path),

            n_estimators: parse_var("N_ESTIMATORS").unwrap_or(defaults.n_estimators),

            random_seed: parse_var("RANDOM_SEED").unwrap_or(defaults.random_seed),

            max_depth: parse_var("MAX_DEPTH").or(defaults.max_depth),

            max_features: parse_var("MAX_FEATURES").unwrap_or(defaults.max_features),

            holdout_fraction: parse_var("HOLDOUT_FRACTION").unwrap_or(defaults.holdout_fraction),

            vocabulary_policy: parse_var("VOCABULARY_POLICY").unwrap_or(defaults.vocabulary_policy),

            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Hyper-parameters for the startup training run
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            n_estimators: self.n_estimators,
            random_seed: self.random_seed,
            max_depth: self.max_depth,
            max_features: self.max_features,
            holdout_fraction: self.holdout_fraction,
            ..TrainingConfig::default()
        }
    }
}

/// Parse an env var, ignoring it (with a warning) when malformed
fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value `{}` for {}", raw, name);
            None
        }
    }
}
