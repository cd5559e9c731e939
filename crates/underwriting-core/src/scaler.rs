use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::preprocessing::numerical::{self, StandardScalerParameters};

/// Per-feature standardisation `(x - mean) / std` (population std), backed by smartcore.
///
/// Columns that are constant in the training data are only centred: smartcore
/// would divide them by `f64::MIN_POSITIVE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    inner: numerical::StandardScaler<f64>,
    /// (column, training value) for every constant column
    constant: Vec<(usize, f64)>,
    n_features: usize,
}

impl StandardScaler {
    pub fn fit(x: &[Vec<f64>]) -> Result<Self> {
        let first = x.first().ok_or_else(|| anyhow!("cannot fit scaler on empty matrix"))?;
        let n_features = first.len();
        ensure!(n_features > 0, "cannot fit scaler on zero-width rows");
        for row in x {
            ensure!(
                row.len() == n_features,
                "ragged matrix: row width {} != {}",
                row.len(),
                n_features
            );
        }

        let xm = DenseMatrix::from_2d_vec(&x.to_vec());
        let inner = numerical::StandardScaler::<f64>::fit(&xm, StandardScalerParameters::default())
            .map_err(|e| anyhow!("scaler fit failed: {e}"))?;
        let constant = (0..n_features)
            .filter(|&c| x.iter().all(|r| r[c] == first[c]))
            .map(|c| (c, first[c]))
            .collect();

        Ok(Self {
            inner,
            constant,
            n_features,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        let mut out = self.transform(std::slice::from_ref(&row.to_vec()))?;
        out.pop().ok_or_else(|| anyhow!("scaler returned no rows"))
    }

    pub fn transform(&self, x: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if x.is_empty() {
            return Ok(vec![]);
        }
        for row in x {
            ensure!(
                row.len() == self.n_features,
                "scaler expects {} features, got {}",
                self.n_features,
                row.len()
            );
        }

        let xm = DenseMatrix::from_2d_vec(&x.to_vec());
        let scaled = self
            .inner
            .transform(&xm)
            .map_err(|e| anyhow!("scaler transform failed: {e}"))?;

        Ok(x.iter()
            .enumerate()
            .map(|(i, row)| {
                let mut out: Vec<f64> = (0..self.n_features).map(|j| *scaled.get((i, j))).collect();
                // 常数列：只做中心化
                for &(c, v) in &self.constant {
                    out[c] = row[c] - v;
                }
                out
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_transform_standardises_columns() {
        let x = vec![vec![1.0, 10.0], vec![2.0, 10.0], vec![3.0, 10.0]];
        let sc = StandardScaler::fit(&x).unwrap();
        assert_eq!(sc.n_features(), 2);

        let t = sc.transform(&x).unwrap();
        let col0: Vec<f64> = t.iter().map(|r| r[0]).collect();
        // mean 2, population std sqrt(2/3)
        let s = (2.0f64 / 3.0).sqrt();
        for (got, want) in col0.iter().zip([-1.0 / s, 0.0, 1.0 / s]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        // constant column is centred, not divided by zero
        assert!(t.iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn constant_column_keeps_unit_divisor() {
        let x = vec![vec![0.0, 4.0], vec![1.0, 4.0]];
        let sc = StandardScaler::fit(&x).unwrap();
        let r = sc.transform_row(&[0.5, 6.5]).unwrap();
        assert!(r[0].abs() < 1e-12);
        assert!((r[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn row_and_batch_agree_and_survive_serde() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, (i * i) as f64, 1.0]).collect();
        let sc = StandardScaler::fit(&x).unwrap();
        let batch = sc.transform(&x).unwrap();
        assert_eq!(sc.transform_row(&x[7]).unwrap(), batch[7]);

        let back: StandardScaler = serde_json::from_str(&serde_json::to_string(&sc).unwrap()).unwrap();
        let again = back.transform_row(&x[7]).unwrap();
        for (a, b) in again.iter().zip(&batch[7]) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_empty_and_wrong_width() {
        assert!(StandardScaler::fit(&[]).is_err());
        let sc = StandardScaler::fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(sc.transform_row(&[1.0]).is_err());
    }
}
