//! Regression metrics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
    pub n_samples: usize,
}

impl RegressionMetrics {
    /// Compare predictions against targets. Returns None when empty or the
    /// lengths differ.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Option<Self> {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return None;
        }

        let n = y_true.len() as f64;
        let mean = y_true.iter().sum::<f64>() / n;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_err = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            ss_res += (t - p).powi(2);
            ss_tot += (t - mean).powi(2);
            abs_err += (t - p).abs();
        }

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Some(Self {
            r2,
            mae: abs_err / n,
            rmse: (ss_res / n).sqrt(),
            n_samples: y_true.len(),
        })
    }
}
