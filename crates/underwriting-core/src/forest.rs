use crate::config::ForestParams;
use crate::model::{check_width, Regressor};
use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

type Inner = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Bagged regression forest (smartcore), every feature considered at each split.
#[derive(Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_trees: usize,
    inner: Inner,
}

impl std::fmt::Debug for RandomForest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomForest")
            .field("n_features", &self.n_features)
            .field("n_trees", &self.n_trees)
            .finish_non_exhaustive()
    }
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams, seed: u64) -> Result<Self> {
        ensure!(!x.is_empty(), "random forest: empty training set");
        ensure!(x.len() == y.len(), "random forest: {} rows vs {} targets", x.len(), y.len());
        let n_features = x[0].len();
        let n_trees = params.n_trees;

        let xm = DenseMatrix::from_2d_vec(&x.to_vec());
        let params = RandomForestRegressorParameters::default()
            .with_n_trees(n_trees)
            .with_m(n_features)
            .with_seed(seed);

        let inner = Inner::fit(&xm, &y.to_vec(), params)
            .map_err(|e| anyhow!("random forest fit failed: {e}"))?;

        Ok(Self {
            n_features,
            n_trees,
            inner,
        })
    }
}

impl Regressor for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        check_width(self.name(), self.n_features, row)?;
        let xm = DenseMatrix::from_2d_vec(&vec![row.to_vec()]);
        let out = self
            .inner
            .predict(&xm)
            .map_err(|e| anyhow!("random forest predict failed: {e}"))?;
        out.first()
            .copied()
            .ok_or_else(|| anyhow!("random forest predict returned empty"))
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        for r in rows {
            check_width(self.name(), self.n_features, r)?;
        }
        let xm = DenseMatrix::from_2d_vec(&rows.to_vec());
        self.inner
            .predict(&xm)
            .map_err(|e| anyhow!("random forest predict failed: {e}"))
    }
}
