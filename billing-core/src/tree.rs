//! CART regression tree (squared-error criterion)

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use crate::error::{PipelineError, Result};

/// Decision tree node
#[derive(Debug, Clone)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64 },
    /// Internal node with split: `x[feature_idx] <= threshold` goes left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Regression tree model
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn per split (all when None)
    pub max_features: Option<usize>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

/// Running sums for one side of a candidate split
#[derive(Debug, Clone, Copy, Default)]
struct SplitStats {
    n: usize,
    sum: f64,
    sq_sum: f64,
}

impl SplitStats {
    fn from_samples(y: &Array1<f64>, samples: &[usize]) -> Self {
        samples.iter().fold(Self::default(), |mut s, &i| {
            s.push(y[i]);
            s
        })
    }

    fn push(&mut self, v: f64) {
        self.n += 1;
        self.sum += v;
        self.sq_sum += v * v;
    }

    fn mean(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.sum / self.n as f64 }
    }

    /// Sum of squared deviations from the mean
    fn sse(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        (self.sq_sum - self.sum * self.sum / self.n as f64).max(0.0)
    }
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    /// sum_l^2/n_l + sum_r^2/n_r, larger is better
    proxy: f64,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegressionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set number of features drawn per split
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Fit on every row of `x`
    pub fn fit<R: Rng>(&mut self, x: &Array2<f64>, y: &Array1<f64>, rng: &mut R) -> Result<&mut Self> {
        let samples: Vec<usize> = (0..x.nrows()).collect();
        self.fit_samples(x, y, samples, rng)
    }

    /// Fit on the rows listed in `samples` (repeats allowed, as in a bootstrap)
    pub fn fit_samples<R: Rng>(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        samples: Vec<usize>,
        rng: &mut R,
    ) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if samples.is_empty() {
            return Err(PipelineError::EmptyDataset { stage: "bootstrap sampling" });
        }

        self.n_features = x.ncols();
        let mut importances = vec![0.0; self.n_features];
        let root = self.build(x, y, samples, 0, rng, &mut importances);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        self.root = Some(root);
        self.feature_importances = importances;
        Ok(self)
    }

    fn build<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        samples: Vec<usize>,
        depth: usize,
        rng: &mut R,
        importances: &mut [f64],
    ) -> TreeNode {
        let stats = SplitStats::from_samples(y, &samples);
        let n_samples = samples.len();
        let leaf = |stats: &SplitStats| TreeNode::Leaf { value: stats.mean() };

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || stats.sse() <= f64::EPSILON * stats.sq_sum.abs().max(1.0);

        if should_stop {
            return leaf(&stats);
        }

        let best = match self.find_best_split(x, y, &samples, &stats, rng) {
            Some(best) => best,
            None => return leaf(&stats),
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| x[[i, best.feature_idx]] <= best.threshold);

        let parent_proxy = stats.sum * stats.sum / n_samples as f64;
        importances[best.feature_idx] += best.proxy - parent_proxy;

        let left = Box::new(self.build(x, y, left_samples, depth + 1, rng, importances));
        let right = Box::new(self.build(x, y, right_samples, depth + 1, rng, importances));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
        }
    }

    /// Sort-and-sweep over each candidate feature
    fn find_best_split<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        samples: &[usize],
        parent: &SplitStats,
        rng: &mut R,
    ) -> Option<BestSplit> {
        let n_features = x.ncols();
        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < n_features => rand::seq::index::sample(rng, n_features, k.max(1)).into_vec(),
            _ => (0..n_features).collect(),
        };

        let parent_proxy = parent.sum * parent.sum / parent.n as f64;
        let mut best: Option<BestSplit> = None;
        let mut order = samples.to_vec();

        for feature_idx in candidates {
            order.sort_unstable_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

            let mut left = SplitStats::default();
            for k in 0..order.len() - 1 {
                let i = order[k];
                left.push(y[i]);

                let current = x[[i, feature_idx]];
                let next = x[[order[k + 1], feature_idx]];
                if current == next {
                    continue;
                }

                let right_n = parent.n - left.n;
                if left.n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }

                let right_sum = parent.sum - left.sum;
                let proxy = left.sum * left.sum / left.n as f64 + right_sum * right_sum / right_n as f64;

                if proxy > parent_proxy && best.as_ref().map_or(true, |b| proxy > b.proxy) {
                    let mut threshold = current + (next - current) / 2.0;
                    if threshold >= next {
                        threshold = current;
                    }
                    best = Some(BestSplit { feature_idx, threshold, proxy });
                }
            }
        }

        best
    }

    /// Predict a single feature row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let mut node = self.root.as_ref().ok_or(PipelineError::NotFitted)?;
        if row.len() != self.n_features {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", row.len()),
            });
        }

        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Normalized impurity decrease per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Get tree depth
    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        self.root.as_ref().map_or(0, node_depth)
    }

    /// Get number of leaves
    pub fn n_leaves(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => count(left) + count(right),
            }
        }
        self.root.as_ref().map_or(0, count)
    }
}
