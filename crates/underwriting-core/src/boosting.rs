use crate::config::BoostingParams;
use crate::model::{check_width, Regressor};
use crate::tree::{RegressionTree, SortedColumns, TreeParams};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Additive tree ensemble under squared loss.
///
/// `pred(x) = base + learning_rate * sum(tree_k(x))`, base = mean(y).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeBooster {
    n_features: usize,
    base: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl TreeBooster {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostingParams, label: &str) -> Result<Self> {
        ensure!(!x.is_empty(), "{label}: empty training set");
        ensure!(x.len() == y.len(), "{label}: {} rows vs {} targets", x.len(), y.len());

        let n_features = x[0].len();
        let base = y.iter().mean();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            lambda: params.lambda,
            gamma: params.gamma,
            min_child_weight: params.min_child_weight,
        };

        let sorted = SortedColumns::new(x);
        let mut pred = vec![base; y.len()];
        let mut grad = vec![0.0; y.len()];
        let hess = vec![1.0; y.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for ((g, p), t) in grad.iter_mut().zip(&pred).zip(y) {
                *g = p - t;
            }
            let tree = RegressionTree::fit(x, &sorted, &grad, &hess, tree_params);
            for (p, row) in pred.iter_mut().zip(x) {
                *p += params.learning_rate * tree.predict_row(row);
            }
            trees.push(tree);

            if (round + 1) % 50 == 0 {
                let rmse = (pred
                    .iter()
                    .zip(y)
                    .map(|(p, t)| (p - t) * (p - t))
                    .sum::<f64>()
                    / y.len() as f64)
                    .sqrt();
                tracing::debug!(model = label, round = round + 1, train_rmse = rmse, "boosting");
            }
        }

        Ok(Self {
            n_features,
            base,
            learning_rate: params.learning_rate,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn raw_predict(&self, row: &[f64]) -> f64 {
        self.base
            + self.learning_rate * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

/// Least-squares gradient boosting: shallow trees fitted to residuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradientBoosting(TreeBooster);

impl GradientBoosting {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostingParams) -> Result<Self> {
        TreeBooster::fit(x, y, params, "gradient_boosting").map(Self)
    }

    pub fn booster(&self) -> &TreeBooster {
        &self.0
    }
}

impl Regressor for GradientBoosting {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn n_features(&self) -> usize {
        self.0.n_features
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        check_width(self.name(), self.0.n_features, row)?;
        Ok(self.0.raw_predict(row))
    }
}

/// Second-order boosting with L2-regularised leaves and gain pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoostedTrees(TreeBooster);

impl BoostedTrees {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostingParams) -> Result<Self> {
        TreeBooster::fit(x, y, params, "xgboost").map(Self)
    }

    pub fn booster(&self) -> &TreeBooster {
        &self.0
    }
}

impl Regressor for BoostedTrees {
    fn name(&self) -> &'static str {
        "xgboost"
    }

    fn n_features(&self) -> usize {
        self.0.n_features
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        check_width(self.name(), self.0.n_features, row)?;
        Ok(self.0.raw_predict(row))
    }
}
