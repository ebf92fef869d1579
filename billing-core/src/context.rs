//! Model context - the build-once, read-many state behind every estimate
//!
//! ```text
//! PatientRow[] ─► remove_outliers ─► OneHotEncoder::fit ─► transform
//!                                                              │
//!              RandomForestRegressor::fit ◄─ StandardScaler ◄──┘
//! ```
//!
//! A `ModelContext` is never mutated after `build`; share it behind an `Arc`.

use std::path::Path;
use std::time::Instant;

use ndarray::Array1;
use serde::Serialize;

use crate::dataset::{self, PatientRow, COL_AGE, COL_LENGTH_OF_STAY};
use crate::encoding::{AlignedRow, OneHotEncoder};
use crate::error::{PipelineError, Result};
use crate::forest::{MaxFeatures, RandomForestRegressor};
use crate::inference::{Estimate, PatientInput, VocabularyPolicy};
use crate::metrics::RegressionMetrics;
use crate::outlier::{self, IqrBounds};
use crate::scaler::StandardScaler;

// ============================================================================
// CONFIG
// ============================================================================

/// Training hyper-parameters
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub n_estimators: usize,
    pub random_seed: u64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Share of rows held out for evaluation before the final refit (0 disables)
    pub holdout_fraction: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            random_seed: 42,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            holdout_fraction: 0.0,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig("n_estimators must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return Err(PipelineError::InvalidConfig(format!(
                "holdout_fraction must be in [0, 1), got {}",
                self.holdout_fraction
            )));
        }
        Ok(())
    }

    fn forest(&self) -> RandomForestRegressor {
        RandomForestRegressor::new(self.n_estimators)
            .with_random_state(self.random_seed)
            .with_max_depth(self.max_depth)
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
    }
}

/// Summary of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub rows_loaded: usize,
    pub rows_after_outliers: usize,
    pub billing_bounds: IqrBounds,
    pub n_features: usize,
    pub oob: Option<RegressionMetrics>,
    pub holdout: Option<RegressionMetrics>,
    pub elapsed_ms: u128,
}

// ============================================================================
// CONTEXT
// ============================================================================

/// Fitted encoder, scaler and regressor
#[derive(Debug, Clone)]
pub struct ModelContext {
    encoder: OneHotEncoder,
    scaler: StandardScaler,
    forest: RandomForestRegressor,
    policy: VocabularyPolicy,
}

impl ModelContext {
    /// Load the dataset at `path` and build a context from it
    pub fn from_csv(path: impl AsRef<Path>, config: &TrainingConfig) -> Result<(Self, TrainingReport)> {
        let rows = dataset::load_csv(path)?;
        Self::build(rows, config)
    }

    /// Build-context phase: cleaned rows in, fitted context out
    pub fn build(rows: Vec<PatientRow>, config: &TrainingConfig) -> Result<(Self, TrainingReport)> {
        config.validate()?;
        let started = Instant::now();

        let rows_loaded = rows.len();
        if rows_loaded == 0 {
            return Err(PipelineError::EmptyDataset { stage: "cleaning" });
        }

        let (rows, billing_bounds) = outlier::remove_outliers(rows)?;

        let holdout = if config.holdout_fraction > 0.0 {
            Some(Self::evaluate_holdout(&rows, config)?)
        } else {
            None
        };

        let context = Self::fit(&rows, config)?;

        let report = TrainingReport {
            rows_loaded,
            rows_after_outliers: rows.len(),
            billing_bounds,
            n_features: context.encoder.n_features(),
            oob: context.forest.oob_metrics(),
            holdout,
            elapsed_ms: started.elapsed().as_millis(),
        };

        log::info!(
            "Model trained on {} rows ({} loaded), {} features, {} trees in {} ms",
            report.rows_after_outliers,
            report.rows_loaded,
            report.n_features,
            context.forest.n_trees(),
            report.elapsed_ms
        );
        if let Some(oob) = &report.oob {
            log::info!("OOB: r2={:.4} mae={:.2} rmse={:.2}", oob.r2, oob.mae, oob.rmse);
        }

        Ok((context, report))
    }

    fn fit(rows: &[PatientRow], config: &TrainingConfig) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::EmptyDataset { stage: "outlier removal" });
        }

        let encoder = OneHotEncoder::fit(rows)?;
        let mut x = encoder.transform(rows);
        let y: Array1<f64> = rows.iter().map(|r| r.billing_amount).collect();

        let mut scaler = StandardScaler::new();
        scaler.fit_transform(&mut x, &numeric_indices(&encoder)?)?;

        let mut forest = config.forest();
        forest.fit(&x, &y)?;

        Ok(Self {
            encoder,
            scaler,
            forest,
            policy: VocabularyPolicy::default(),
        })
    }

    /// Fit on a seeded train split, score on the rest
    fn evaluate_holdout(rows: &[PatientRow], config: &TrainingConfig) -> Result<RegressionMetrics> {
        let (train, test) = dataset::train_test_split(rows, config.holdout_fraction, config.random_seed)?;
        if test.is_empty() {
            return Err(PipelineError::InvalidConfig("holdout split left no test rows".to_string()));
        }

        let model = Self::fit(&train, config)?;
        let mut x_test = model.encoder.transform(&test);
        model.scaler.transform(&mut x_test)?;
        let predictions = model.forest.predict(&x_test)?;

        let y_test: Vec<f64> = test.iter().map(|r| r.billing_amount).collect();
        let metrics = RegressionMetrics::compute(&y_test, &predictions.to_vec())
            .ok_or_else(|| PipelineError::InvalidConfig("holdout split left no test rows".to_string()))?;

        log::info!(
            "Holdout ({} train / {} test): r2={:.4} mae={:.2} rmse={:.2}",
            train.len(),
            test.len(),
            metrics.r2,
            metrics.mae,
            metrics.rmse
        );
        Ok(metrics)
    }

    pub fn with_vocabulary_policy(mut self, policy: VocabularyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn vocabulary_policy(&self) -> VocabularyPolicy {
        self.policy
    }

    /// Ordered feature columns the regressor expects
    pub fn feature_columns(&self) -> &[String] {
        self.encoder.feature_columns()
    }

    pub fn encoder(&self) -> &OneHotEncoder {
        &self.encoder
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn forest(&self) -> &RandomForestRegressor {
        &self.forest
    }

    /// Normalise, align and scale one input into the training feature space
    pub fn feature_vector(&self, input: &PatientInput) -> Result<AlignedRow> {
        let input = input.normalized();
        let mut aligned = self.encoder.align(&input);
        self.scaler.transform_row(&mut aligned.values)?;
        Ok(aligned)
    }

    /// Estimate the bill for one input
    pub fn predict(&self, input: &PatientInput) -> Result<Estimate> {
        let aligned = self.feature_vector(input)?;

        if !aligned.unseen.is_empty() {
            match self.policy {
                VocabularyPolicy::Reject => return Err(PipelineError::UnseenCategories(aligned.unseen)),
                VocabularyPolicy::Warn => {
                    for u in &aligned.unseen {
                        log::warn!("Unseen category `{}` for column `{}` dropped from features", u.value, u.column);
                    }
                }
            }
        }

        let amount = self.forest.predict_row(aligned.values.view())?;
        Ok(Estimate {
            amount,
            unseen: aligned.unseen,
        })
    }
}

fn numeric_indices(encoder: &OneHotEncoder) -> Result<Vec<usize>> {
    [COL_AGE, COL_LENGTH_OF_STAY]
        .iter()
        .map(|name| {
            encoder
                .column_index(name)
                .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::IDENTIFYING_COLUMNS;

    const GENDERS: [&str; 2] = ["female", "male"];
    const BLOOD: [&str; 3] = ["a+", "b-", "o+"];
    const CONDITIONS: [&str; 3] = ["asthma", "cancer", "diabetes"];

    /// Deterministic synthetic admissions where the bill grows with stay and
    /// depends on the condition
    fn synthetic_rows(n: usize) -> Vec<PatientRow> {
        (0..n)
            .map(|i| {
                let stay = (i % 15) as i64 + 1;
                let condition = CONDITIONS[i % 3];
                let base = match condition {
                    "cancer" => 9000.0,
                    "diabetes" => 4000.0,
                    _ => 2000.0,
                };
                PatientRow {
                    age: 20.0 + (i % 50) as f64,
                    gender: GENDERS[i % 2].to_string(),
                    blood_type: BLOOD[(i / 2) % 3].to_string(),
                    medical_condition: condition.to_string(),
                    admission_type: if i % 4 == 0 { "emergency" } else { "elective" }.to_string(),
                    insurance_provider: "aetna".to_string(),
                    medication: "aspirin".to_string(),
                    test_results: "normal".to_string(),
                    length_of_stay: stay,
                    billing_amount: base + 500.0 * stay as f64,
                }
            })
            .collect()
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            n_estimators: 15,
            ..Default::default()
        }
    }

    fn input(gender: &str, blood: &str, condition: &str, stay: i64) -> PatientInput {
        PatientInput {
            age: 45,
            gender: gender.to_string(),
            blood_type: blood.to_string(),
            medical_condition: condition.to_string(),
            admission_type: "Elective".to_string(),
            insurance_provider: "Aetna".to_string(),
            medication: "Aspirin".to_string(),
            test_results: "Normal".to_string(),
            length_of_stay: stay,
        }
    }

    #[test]
    fn test_build_report() {
        let (ctx, report) = ModelContext::build(synthetic_rows(120), &small_config()).unwrap();

        assert_eq!(report.rows_loaded, 120);
        assert_eq!(report.rows_after_outliers, 120);
        assert_eq!(report.n_features, ctx.feature_columns().len());
        assert!(report.oob.is_some());
        assert!(report.holdout.is_none());
        assert_eq!(ctx.forest().n_trees(), 15);
        assert_eq!(&ctx.feature_columns()[..2], &["Age", "Length of Stay"]);
    }

    #[test]
    fn test_feature_matrix_excludes_dropped_columns() {
        let (ctx, _) = ModelContext::build(synthetic_rows(60), &small_config()).unwrap();
        let dropped: Vec<&str> = IDENTIFYING_COLUMNS
            .iter()
            .copied()
            .chain([dataset::COL_ADMISSION_DATE, dataset::COL_DISCHARGE_DATE, dataset::COL_BILLING_AMOUNT])
            .collect();

        for column in ctx.feature_columns() {
            assert!(!dropped.iter().any(|d| column.starts_with(d)), "{} should not be a feature", column);
        }
    }

    #[test]
    fn test_prediction_tracks_condition() {
        let (ctx, _) = ModelContext::build(synthetic_rows(300), &small_config()).unwrap();

        let cancer = ctx.predict(&input("Male", "A+", "Cancer", 5)).unwrap();
        let asthma = ctx.predict(&input("Male", "A+", "Asthma", 5)).unwrap();

        assert!(cancer.unseen.is_empty());
        assert!(cancer.amount > asthma.amount);
        assert!((cancer.amount - 11500.0).abs() < 1500.0, "cancer estimate {}", cancer.amount);
    }

    #[test]
    fn test_encoding_same_input_is_idempotent() {
        let (ctx, _) = ModelContext::build(synthetic_rows(90), &small_config()).unwrap();
        let probe = input("Female", "O+", "Diabetes", 3);

        let a = ctx.feature_vector(&probe).unwrap();
        let b = ctx.feature_vector(&probe).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.predict(&probe).unwrap(), ctx.predict(&probe).unwrap());
    }

    #[test]
    fn test_aligned_vector_has_training_layout() {
        let (ctx, _) = ModelContext::build(synthetic_rows(90), &small_config()).unwrap();
        let aligned = ctx.feature_vector(&input("Female", "O+", "Diabetes", 3)).unwrap();

        assert_eq!(aligned.values.len(), ctx.feature_columns().len());
        let diabetes = ctx.encoder().column_index("Medical Condition_diabetes").unwrap();
        let o_pos = ctx.encoder().column_index("Blood Type_o+").unwrap();
        assert_eq!(aligned.values[diabetes], 1.0);
        assert_eq!(aligned.values[o_pos], 1.0);
    }

    #[test]
    fn test_case_insensitive_matches_training_vocabulary() {
        let (ctx, _) = ModelContext::build(synthetic_rows(90), &small_config()).unwrap();

        let upper = ctx.feature_vector(&input("FEMALE", "O+", "DIABETES", 3)).unwrap();
        let lower = ctx.feature_vector(&input("female", "o+", "diabetes", 3)).unwrap();
        assert!(upper.unseen.is_empty());
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_scaled_columns_round_trip() {
        let (ctx, _) = ModelContext::build(synthetic_rows(90), &small_config()).unwrap();
        let mut aligned = ctx.feature_vector(&input("Male", "B-", "Cancer", 11)).unwrap();

        ctx.scaler().inverse_transform_row(&mut aligned.values).unwrap();
        assert!((aligned.values[0] - 45.0).abs() < 1e-9);
        assert!((aligned.values[1] - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_unseen_category_policies() {
        let (ctx, _) = ModelContext::build(synthetic_rows(90), &small_config()).unwrap();
        let probe = input("Male", "AB-", "Cancer", 4);

        let estimate = ctx.predict(&probe).unwrap();
        assert_eq!(estimate.unseen.len(), 1);
        assert_eq!(estimate.unseen[0].column, "Blood Type");
        assert_eq!(estimate.unseen[0].value, "ab-");

        let strict = ctx.clone().with_vocabulary_policy(VocabularyPolicy::Reject);
        match strict.predict(&probe) {
            Err(PipelineError::UnseenCategories(unseen)) => assert_eq!(unseen.len(), 1),
            other => panic!("expected UnseenCategories, got {:?}", other),
        }
        assert!(strict.predict(&input("Male", "A+", "Cancer", 4)).is_ok());
    }

    #[test]
    fn test_outlier_rows_do_not_reach_model() {
        let mut rows = synthetic_rows(40);
        rows.push(PatientRow {
            billing_amount: 10_000_000.0,
            ..rows[0].clone()
        });

        let (_, report) = ModelContext::build(rows, &small_config()).unwrap();
        assert_eq!(report.rows_loaded, 41);
        assert_eq!(report.rows_after_outliers, 40);
        assert!(report.billing_bounds.upper < 10_000_000.0);
    }

    #[test]
    fn test_holdout_evaluation() {
        let config = TrainingConfig {
            holdout_fraction: 0.25,
            ..small_config()
        };
        let (_, report) = ModelContext::build(synthetic_rows(200), &config).unwrap();

        let holdout = report.holdout.expect("holdout metrics");
        assert_eq!(holdout.n_samples, 50);
        assert!(holdout.r2 > 0.5, "holdout r2 {}", holdout.r2);
    }

    #[test]
    fn test_empty_dataset_fails_fast() {
        assert!(matches!(
            ModelContext::build(Vec::new(), &small_config()),
            Err(PipelineError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = TrainingConfig {
            holdout_fraction: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            ModelContext::build(synthetic_rows(10), &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
