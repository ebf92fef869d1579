//! IQR outlier removal on the billing target

use serde::{Deserialize, Serialize};

use crate::dataset::PatientRow;
use crate::error::{PipelineError, Result};

/// Tukey fence multiplier
pub const IQR_MULTIPLIER: f64 = 1.5;

/// Inclusive bounds derived from the quartiles of a distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Compute fences from `values`. Returns None for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        let q1 = quantile_sorted(&sorted, 0.25);
        let q3 = quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;

        Some(Self {
            q1,
            q3,
            lower: q1 - IQR_MULTIPLIER * iqr,
            upper: q3 + IQR_MULTIPLIER * iqr,
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Quantile with linear interpolation between closest ranks.
/// `sorted` must be ascending and non-empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Keep rows whose billing amount lies inside the IQR fences of the input
pub fn remove_outliers(rows: Vec<PatientRow>) -> Result<(Vec<PatientRow>, IqrBounds)> {
    let amounts: Vec<f64> = rows.iter().map(|r| r.billing_amount).collect();
    let bounds = IqrBounds::from_values(&amounts)
        .ok_or(PipelineError::EmptyDataset { stage: "cleaning" })?;

    let before = rows.len();
    let kept: Vec<PatientRow> = rows
        .into_iter()
        .filter(|r| bounds.contains(r.billing_amount))
        .collect();

    log::info!(
        "Outlier removal: kept {}/{} rows (billing range [{:.2}, {:.2}])",
        kept.len(),
        before,
        bounds.lower,
        bounds.upper
    );

    if kept.is_empty() {
        return Err(PipelineError::EmptyDataset { stage: "outlier removal" });
    }

    Ok((kept, bounds))
}
