use crate::config::TrainingConfig;
use anyhow::{Context, Result};
use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

/// Row-major samples plus regression targets.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.x.first().map(|r| r.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

/// Synthetic training set: uniform features, target driven by the first two.
///
/// `y = exp(x0 + x1^2 + e) * target_scale` with `e ~ N(0, noise_std)`.
pub fn synthesize(cfg: &TrainingConfig, n_features: usize) -> Result<Dataset> {
    let noise = Normal::new(0.0, cfg.noise_std).context("noise distribution")?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let x: Vec<Vec<f64>> = (0..cfg.n_samples)
        .map(|_| (0..n_features).map(|_| rng.gen::<f64>()).collect())
        .collect();

    let y = x
        .iter()
        .map(|row| {
            let x0 = row.first().copied().unwrap_or(0.0);
            let x1 = row.get(1).copied().unwrap_or(0.0);
            (x0 + x1 * x1 + noise.sample(&mut rng)).exp() * cfg.target_scale
        })
        .collect();

    Ok(Dataset { x, y })
}

/// Seeded shuffle, then the first `round(n * test_fraction)` rows become the test split.
pub fn train_test_split(data: &Dataset, test_fraction: f64, seed: u64) -> Split {
    let n = data.len();
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let n_test = ((n as f64) * test_fraction).round() as usize;
    let n_test = n_test.min(n);
    let (test_idx, train_idx) = idx.split_at(n_test);

    let take = |ids: &[usize]| Dataset {
        x: ids.iter().map(|&i| data.x[i].clone()).collect(),
        y: ids.iter().map(|&i| data.y[i]).collect(),
    };

    Split {
        train: take(train_idx),
        test: take(test_idx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_shape_and_range() {
        let cfg = TrainingConfig::small(200);
        let ds = synthesize(&cfg, 20).unwrap();
        assert_eq!(ds.len(), 200);
        assert_eq!(ds.n_features(), 20);
        assert!(ds.x.iter().flatten().all(|v| (0.0..1.0).contains(v)));
        // exp(x0 + x1^2 + e) * 1e4, with |e| well under 1 for sigma=0.1
        assert!(ds.y.iter().all(|&t| t > 10_000.0 * (-1.0f64).exp() && t < 10_000.0 * 3.0f64.exp()));
    }

    #[test]
    fn synthesize_is_deterministic() {
        let cfg = TrainingConfig::small(50);
        let a = synthesize(&cfg, 4).unwrap();
        let b = synthesize(&cfg, 4).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
    }

    #[test]
    fn noise_has_configured_spread() {
        use statrs::statistics::Statistics;

        let mut cfg = TrainingConfig::small(4000);
        cfg.noise_std = 0.3;
        let ds = synthesize(&cfg, 2).unwrap();
        // ln(y / scale) - x0 - x1^2 is exactly the noise term
        let e: Vec<f64> = ds
            .x
            .iter()
            .zip(&ds.y)
            .map(|(r, t)| (t / cfg.target_scale).ln() - r[0] - r[1] * r[1])
            .collect();
        assert!(e.iter().mean().abs() < 0.03);
        assert!((e.iter().population_std_dev() - 0.3).abs() < 0.03);

        cfg.noise_std = 0.0;
        assert!(synthesize(&cfg, 2).is_err());
    }

    #[test]
    fn split_sizes_and_reproducibility() {
        let cfg = TrainingConfig::small(100);
        let ds = synthesize(&cfg, 3).unwrap();
        let s1 = train_test_split(&ds, 0.2, 42);
        let s2 = train_test_split(&ds, 0.2, 42);
        assert_eq!(s1.test.len(), 20);
        assert_eq!(s1.train.len(), 80);
        assert_eq!(s1.test.y, s2.test.y);

        let s3 = train_test_split(&ds, 0.2, 43);
        assert_ne!(s1.test.y, s3.test.y);
    }
}
