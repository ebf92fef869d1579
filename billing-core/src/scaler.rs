//! Standardization of the numeric feature columns

use ndarray::{Array1, Array2, Axis};

use crate::error::{PipelineError, Result};

/// Fitted parameters for one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalerParams {
    pub column: usize,
    pub mean: f64,
    pub scale: f64,
}

/// z-score scaler over a fixed set of matrix columns: (x - mean) / std.
/// Uses the population standard deviation; a constant column gets scale 1.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    params: Vec<ScalerParams>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on `columns` of `x`
    pub fn fit(&mut self, x: &Array2<f64>, columns: &[usize]) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(PipelineError::EmptyDataset { stage: "scaling" });
        }

        let mut params = Vec::with_capacity(columns.len());
        for &column in columns {
            if column >= x.ncols() {
                return Err(PipelineError::ShapeMismatch {
                    expected: format!("column index < {}", x.ncols()),
                    actual: format!("column index {}", column),
                });
            }
            let values = x.index_axis(Axis(1), column);
            let mean = values.mean().unwrap_or(0.0);
            let std = values.std(0.0);
            params.push(ScalerParams {
                column,
                mean,
                scale: if std == 0.0 || !std.is_finite() { 1.0 } else { std },
            });
        }

        self.params = params;
        Ok(self)
    }

    /// Fit and scale the matrix in place
    pub fn fit_transform(&mut self, x: &mut Array2<f64>, columns: &[usize]) -> Result<()> {
        self.fit(x, columns)?;
        self.transform(x)
    }

    pub fn is_fitted(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn params(&self) -> &[ScalerParams] {
        &self.params
    }

    pub fn means(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.mean).collect()
    }

    pub fn scales(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.scale).collect()
    }

    /// Scale every row of `x` in place
    pub fn transform(&self, x: &mut Array2<f64>) -> Result<()> {
        self.check_fitted()?;
        for p in &self.params {
            x.index_axis_mut(Axis(1), p.column)
                .mapv_inplace(|v| (v - p.mean) / p.scale);
        }
        Ok(())
    }

    /// Scale a single aligned row in place
    pub fn transform_row(&self, row: &mut Array1<f64>) -> Result<()> {
        self.apply_row(row, |v, p| (v - p.mean) / p.scale)
    }

    /// Undo the scaling of a single row in place
    pub fn inverse_transform_row(&self, row: &mut Array1<f64>) -> Result<()> {
        self.apply_row(row, |v, p| v * p.scale + p.mean)
    }

    /// Every fitted column must exist in `row`; nothing is written otherwise
    fn apply_row(&self, row: &mut Array1<f64>, f: impl Fn(f64, &ScalerParams) -> f64) -> Result<()> {
        self.check_fitted()?;
        if let Some(p) = self.params.iter().find(|p| p.column >= row.len()) {
            return Err(PipelineError::ShapeMismatch {
                expected: format!("row with more than {} values", p.column),
                actual: format!("row with {} values", row.len()),
            });
        }
        for p in &self.params {
            row[p.column] = f(row[p.column], p);
        }
        Ok(())
    }

    fn check_fitted(&self) -> Result<()> {
        if self.is_fitted() {
            Ok(())
        } else {
            Err(PipelineError::NotFitted)
        }
    }
}
