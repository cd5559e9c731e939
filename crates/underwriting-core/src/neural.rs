//! Small feed-forward regressor: dense ReLU layers, dropout while training, Adam on MSE.
//!
//! Targets are standardised before fitting; predictions are mapped back to the
//! original scale, so callers never see the normalised space.

use crate::config::NetworkParams;
use crate::model::{check_width, Regressor};
use anyhow::{ensure, Context, Result};
use ndarray::{Array1, Array2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    w: Array2<f64>, // (in, out)
    b: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    fn init(n_in: usize, n_out: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (n_in + n_out) as f64).sqrt();
        let w = Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit));
        Self {
            w,
            b: Array1::zeros(n_out),
        }
    }

    fn forward(&self, a: &Array2<f64>) -> Array2<f64> {
        a.dot(&self.w) + &self.b
    }
}

#[derive(Debug, Clone)]
struct AdamSlot {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl AdamSlot {
    fn for_layer(l: &Dense) -> Self {
        Self {
            m_w: Array2::zeros(l.w.raw_dim()),
            v_w: Array2::zeros(l.w.raw_dim()),
            m_b: Array1::zeros(l.b.raw_dim()),
            v_b: Array1::zeros(l.b.raw_dim()),
        }
    }
}

fn adam_step<D: ndarray::Dimension>(
    param: &mut ndarray::Array<f64, D>,
    m: &mut ndarray::Array<f64, D>,
    v: &mut ndarray::Array<f64, D>,
    grad: &ndarray::Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(m)
        .and(v)
        .and(grad)
        .for_each(|p, m, v, &g| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPS);
        });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetwork {
    n_features: usize,
    layers: Vec<Dense>,
    y_mean: f64,
    y_std: f64,
}

fn to_array(rows: &[Vec<f64>], n_features: usize) -> Result<Array2<f64>> {
    let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((rows.len(), n_features), flat).context("ragged feature matrix")
}

fn mse(pred: &Array2<f64>, y: &Array1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    pred.column(0)
        .iter()
        .zip(y.iter())
        .map(|(p, t)| (p - t) * (p - t))
        .sum::<f64>()
        / y.len() as f64
}

impl NeuralNetwork {
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &NetworkParams, seed: u64) -> Result<Self> {
        ensure!(!x.is_empty(), "neural_network: empty training set");
        ensure!(x.len() == y.len(), "neural_network: {} rows vs {} targets", x.len(), y.len());
        ensure!(
            params.dropout.len() == params.hidden.len(),
            "neural_network: {} dropout rates for {} hidden layers",
            params.dropout.len(),
            params.hidden.len()
        );

        let n_features = x[0].len();
        let y_mean = y.iter().mean();
        let y_std = y.iter().population_std_dev();
        let y_std = if y_std > 0.0 { y_std } else { 1.0 };

        // Keras 语义：validation 取训练集末尾，不参与 shuffle
        let n_val = ((x.len() as f64) * params.validation_split) as usize;
        let n_val = if n_val >= x.len() { 0 } else { n_val };
        let n_fit = x.len() - n_val;

        let xa = to_array(x, n_features)?;
        let ya: Array1<f64> = y.iter().map(|t| (t - y_mean) / y_std).collect();
        let (x_fit, x_val) = xa.view().split_at(Axis(0), n_fit);
        let (y_fit, y_val) = ya.view().split_at(Axis(0), n_fit);
        let (x_fit, x_val) = (x_fit.to_owned(), x_val.to_owned());
        let (y_fit, y_val) = (y_fit.to_owned(), y_val.to_owned());

        let mut rng = StdRng::seed_from_u64(seed);
        let mut widths = vec![n_features];
        widths.extend(params.hidden.iter().copied());
        widths.push(1);
        let mut net = Self {
            n_features,
            layers: widths
                .windows(2)
                .map(|w| Dense::init(w[0], w[1], &mut rng))
                .collect(),
            y_mean,
            y_std,
        };

        let mut slots: Vec<AdamSlot> = net.layers.iter().map(AdamSlot::for_layer).collect();
        let mut step: i32 = 0;
        let mut order: Vec<usize> = (0..n_fit).collect();

        for epoch in 0..params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(params.batch_size) {
                let xb = x_fit.select(Axis(0), batch);
                let yb = y_fit.select(Axis(0), batch);
                step += 1;
                let lr_t = params.learning_rate * (1.0 - BETA2.powi(step)).sqrt()
                    / (1.0 - BETA1.powi(step));

                epoch_loss += net.train_batch(&xb, &yb, &params.dropout, &mut slots, lr_t, &mut rng)
                    * batch.len() as f64;
            }

            if (epoch + 1) % 10 == 0 || epoch + 1 == params.epochs {
                let val_loss = if n_val > 0 {
                    mse(&net.forward(&x_val), &y_val)
                } else {
                    f64::NAN
                };
                tracing::debug!(
                    epoch = epoch + 1,
                    loss = epoch_loss / n_fit.max(1) as f64,
                    val_loss,
                    "neural_network"
                );
            }
        }

        Ok(net)
    }

    /// One Adam step on a mini-batch; returns the batch MSE (normalised space).
    fn train_batch(
        &mut self,
        xb: &Array2<f64>,
        yb: &Array1<f64>,
        dropout: &[f64],
        slots: &mut [AdamSlot],
        lr_t: f64,
        rng: &mut StdRng,
    ) -> f64 {
        let n_layers = self.layers.len();
        let mut inputs: Vec<Array2<f64>> = Vec::with_capacity(n_layers);
        // d(activation)/d(pre-activation) with the dropout mask folded in
        let mut derivs: Vec<Array2<f64>> = Vec::with_capacity(n_layers - 1);

        let mut a = xb.clone();
        for (li, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&a);
            inputs.push(a);
            if li + 1 == n_layers {
                a = z;
                break;
            }
            let p = dropout.get(li).copied().unwrap_or(0.0);
            let keep = 1.0 / (1.0 - p);
            let d = z.mapv(|v| {
                let alive = p == 0.0 || rng.gen::<f64>() >= p;
                if v > 0.0 && alive { keep } else { 0.0 }
            });
            a = &z * &d;
            derivs.push(d);
        }

        let out = a;
        let n = yb.len() as f64;
        let loss = mse(&out, yb);

        let mut delta = out;
        Zip::from(delta.column_mut(0))
            .and(yb)
            .for_each(|d, &t| *d = 2.0 * (*d - t) / n);

        for li in (0..n_layers).rev() {
            let grad_w = inputs[li].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            if li > 0 {
                delta = delta.dot(&self.layers[li].w.t()) * &derivs[li - 1];
            }
            let layer = &mut self.layers[li];
            let slot = &mut slots[li];
            adam_step(&mut layer.w, &mut slot.m_w, &mut slot.v_w, &grad_w, lr_t);
            adam_step(&mut layer.b, &mut slot.m_b, &mut slot.v_b, &grad_b, lr_t);
        }

        loss
    }

    /// Inference pass in the normalised target space.
    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let last = self.layers.len() - 1;
        let mut a = x.clone();
        for (li, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&a);
            a = if li == last { z } else { z.mapv(|v| v.max(0.0)) };
        }
        a
    }
}

impl Regressor for NeuralNetwork {
    fn name(&self) -> &'static str {
        "neural_network"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        check_width(self.name(), self.n_features, row)?;
        let x = Array2::from_shape_vec((1, row.len()), row.to_vec()).context("feature row")?;
        Ok(self.forward(&x)[[0, 0]] * self.y_std + self.y_mean)
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(vec![]);
        }
        for r in rows {
            check_width(self.name(), self.n_features, r)?;
        }
        let x = to_array(rows, self.n_features)?;
        Ok(self
            .forward(&x)
            .column(0)
            .iter()
            .map(|v| v * self.y_std + self.y_mean)
            .collect())
    }
}
