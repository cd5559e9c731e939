use crate::model::Regressor;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use smartcore::metrics::{mean_absolute_error, mean_squared_error, r2};
use statrs::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub mse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl Evaluation {
    pub fn from_predictions(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        ensure!(
            y_true.len() == y_pred.len(),
            "length mismatch: {} targets vs {} predictions",
            y_true.len(),
            y_pred.len()
        );
        ensure!(!y_true.is_empty(), "cannot evaluate on an empty set");

        let (t, p) = (y_true.to_vec(), y_pred.to_vec());
        // constant target: R² is undefined, report 0
        let r2_score = if y_true.iter().population_variance() > 0.0 {
            r2(&t, &p)
        } else {
            0.0
        };

        Ok(Self {
            mse: mean_squared_error(&t, &p),
            mae: mean_absolute_error(&t, &p),
            r2: r2_score,
        })
    }
}

pub fn evaluate(model: &dyn Regressor, x: &[Vec<f64>], y: &[f64]) -> Result<Evaluation> {
    let pred = model.predict(x)?;
    Evaluation::from_predictions(y, &pred)
}
