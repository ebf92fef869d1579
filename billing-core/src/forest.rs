//! Random forest regressor
//!
//! Bagged ensemble of [`RegressionTree`]s. Each tree owns an RNG seeded from
//! `random_state + tree_index`, so a fitted forest is identical regardless of
//! how rayon schedules the trees.

use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};
use crate::metrics::RegressionMetrics;
use crate::tree::RegressionTree;

/// Strategy for features considered at each split
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// All features (regression default)
    All,
    /// Square root of n_features
    Sqrt,
    /// Fraction of n_features
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
        }
        .clamp(1, n_features.max(1))
    }
}

/// Parses `all`, `sqrt`, or a fraction in (0, 1]
impl FromStr for MaxFeatures {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(MaxFeatures::All),
            "sqrt" => Ok(MaxFeatures::Sqrt),
            other => match other.parse::<f64>() {
                Ok(f) if f > 0.0 && f <= 1.0 => Ok(MaxFeatures::Fraction(f)),
                _ => Err(PipelineError::InvalidConfig(format!(
                    "max_features must be `all`, `sqrt` or a fraction in (0, 1], got `{}`",
                    other
                ))),
            },
        }
    }
}

/// Random forest model
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random state
    pub random_state: u64,
    n_features: usize,
    feature_importances: Vec<f64>,
    oob_metrics: Option<RegressionMetrics>,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: 42,
            n_features: 0,
            feature_importances: Vec::new(),
            oob_metrics: None,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 {
            return Err(PipelineError::EmptyDataset { stage: "model fitting" });
        }
        if n_samples != y.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig("n_estimators must be at least 1".to_string()));
        }

        self.n_features = n_features;
        let max_features = self.max_features.resolve(n_features);

        // (tree, in-bag mask)
        let fitted: Vec<(RegressionTree, Vec<bool>)> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<(RegressionTree, Vec<bool>)> {
                let seed = self.random_state.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let samples: Vec<usize> = if self.bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut in_bag = vec![false; n_samples];
                for &i in &samples {
                    in_bag[i] = true;
                }

                let mut tree = RegressionTree::new()
                    .with_max_depth(self.max_depth)
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(Some(max_features));
                tree.fit_samples(x, y, samples, &mut rng)?;

                Ok((tree, in_bag))
            })
            .collect::<Result<Vec<_>>>()?;

        let (trees, masks): (Vec<RegressionTree>, Vec<Vec<bool>>) = fitted.into_iter().unzip();
        self.trees = trees;
        self.compute_feature_importances();
        self.oob_metrics = if self.bootstrap {
            self.compute_oob_metrics(x, y, &masks)
        } else {
            None
        };

        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, &v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }

        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        self.feature_importances = total;
    }

    /// Evaluate every row on the trees that never saw it
    fn compute_oob_metrics(&self, x: &Array2<f64>, y: &Array1<f64>, masks: &[Vec<bool>]) -> Option<RegressionMetrics> {
        let n_samples = x.nrows();
        let per_row: Vec<Option<f64>> = (0..n_samples)
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                let (sum, count) = self
                    .trees
                    .iter()
                    .zip(masks)
                    .filter(|(_, mask)| !mask[i])
                    .filter_map(|(tree, _)| tree.predict_row(row).ok())
                    .fold((0.0, 0usize), |(s, c), p| (s + p, c + 1));
                (count > 0).then(|| sum / count as f64)
            })
            .collect();

        let (y_true, y_pred): (Vec<f64>, Vec<f64>) = per_row
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|p| (y[i], p)))
            .unzip();

        if y_true.len() < n_samples {
            log::debug!("{} rows were in-bag for every tree and skipped from OOB scoring", n_samples - y_true.len());
        }
        RegressionMetrics::compute(&y_true, &y_pred)
    }

    /// Mean prediction of all trees for one row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(PipelineError::NotFitted);
        }
        let mut sum = 0.0;
        for tree in &self.trees {
            sum += tree.predict_row(row)?;
        }
        Ok(sum / self.trees.len() as f64)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let predictions = (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(x.row(i)))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array1::from_vec(predictions))
    }

    /// Get feature importances
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Out-of-bag evaluation, available after fitting with bootstrap
    pub fn oob_metrics(&self) -> Option<RegressionMetrics> {
        self.oob_metrics
    }

    /// Get number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}
