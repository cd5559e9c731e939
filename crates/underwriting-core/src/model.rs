use anyhow::{ensure, Result};

/// A fitted single-output regressor over scaled feature rows.
pub trait Regressor: Send + Sync {
    /// Stable key, also used in logs and artifact names.
    fn name(&self) -> &'static str;

    /// Width of the rows the model was trained on.
    fn n_features(&self) -> usize;

    fn predict_row(&self, row: &[f64]) -> Result<f64>;

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}

#[inline]
pub(crate) fn check_width(name: &str, expected: usize, row: &[f64]) -> Result<()> {
    ensure!(
        row.len() == expected,
        "{name}: expected {expected} features, got {}",
        row.len()
    );
    Ok(())
}
