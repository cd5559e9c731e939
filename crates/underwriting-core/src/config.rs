use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// 运行时配置：默认值 + 环境变量覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,

    /// 五个 artifact（四个模型 + scaler）所在目录
    pub model_dir: PathBuf,

    /// quotation <= threshold 才批准
    pub approval_threshold: f64,

    /// 每个用户抽取的特征维度
    pub n_features: usize,

    pub training: TrainingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            model_dir: PathBuf::from("models"),
            approval_threshold: 50_000.0,
            n_features: 20,
            training: TrainingConfig::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by `UNDERWRITING_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading overrides through `lookup`.
    /// Unparsable values are logged and ignored.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(addr) = parse_var::<SocketAddr, _>(&lookup, "UNDERWRITING_BIND_ADDR") {
            cfg.bind_addr = addr;
        }
        if let Some(dir) = lookup("UNDERWRITING_MODEL_DIR") {
            if !dir.trim().is_empty() {
                cfg.model_dir = PathBuf::from(dir);
            }
        }
        if let Some(t) = parse_var::<f64, _>(&lookup, "UNDERWRITING_APPROVAL_THRESHOLD") {
            cfg.approval_threshold = t;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "UNDERWRITING_TRAIN_SAMPLES") {
            cfg.training.n_samples = n;
        }
        if let Some(seed) = parse_var::<u64, _>(&lookup, "UNDERWRITING_SEED") {
            cfg.training.seed = seed;
        }
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.approval_threshold.is_finite() && self.approval_threshold > 0.0,
            "approval_threshold must be finite and > 0, got {}",
            self.approval_threshold
        );
        ensure!(self.n_features > 0, "n_features must be > 0");
        self.training.validate()
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, value = %raw, err = %e, "ignoring invalid config override");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub n_samples: usize,
    pub test_fraction: f64,
    pub seed: u64,

    /// y = exp(x0 + x1^2 + N(0, noise_std)) * target_scale
    pub noise_std: f64,
    pub target_scale: f64,

    pub forest: ForestParams,
    pub gradient_boosting: BoostingParams,
    pub boosted_trees: BoostingParams,
    pub neural_network: NetworkParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_samples: 10_000,
            test_fraction: 0.2,
            seed: 42,
            noise_std: 0.1,
            target_scale: 10_000.0,
            forest: ForestParams::default(),
            gradient_boosting: BoostingParams::gradient_boosting(),
            boosted_trees: BoostingParams::boosted_trees(),
            neural_network: NetworkParams::default(),
        }
    }
}

impl TrainingConfig {
    /// A tiny configuration for tests and smoke runs.
    pub fn small(n_samples: usize) -> Self {
        let mut cfg = Self {
            n_samples,
            ..Self::default()
        };
        cfg.forest.n_trees = 10;
        cfg.gradient_boosting.n_estimators = 20;
        cfg.boosted_trees.n_estimators = 20;
        cfg.neural_network.epochs = 5;
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.test_fraction > 0.0 && self.test_fraction < 1.0,
            "test_fraction must be in (0, 1), got {}",
            self.test_fraction
        );
        let n_test = (self.n_samples as f64 * self.test_fraction).round() as usize;
        ensure!(
            n_test >= 1 && n_test < self.n_samples,
            "n_samples={} leaves no room for a train/test split at test_fraction={}",
            self.n_samples,
            self.test_fraction
        );
        ensure!(
            self.noise_std.is_finite() && self.noise_std > 0.0,
            "noise_std must be finite and > 0, got {}",
            self.noise_std
        );
        ensure!(self.forest.n_trees > 0, "forest.n_trees must be > 0");
        self.gradient_boosting.validate("gradient_boosting")?;
        self.boosted_trees.validate("boosted_trees")?;
        self.neural_network.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self { n_trees: 200 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// minimum loss reduction for a split
    pub gamma: f64,
    pub min_child_weight: f64,
}

impl BoostingParams {
    /// Least-squares boosting: shallow trees, plain mean leaves.
    pub fn gradient_boosting() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.1,
            max_depth: 3,
            lambda: 0.0,
            gamma: 0.0,
            min_child_weight: 1.0,
        }
    }

    /// Second-order boosting with regularised leaves.
    pub fn boosted_trees() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.3,
            max_depth: 6,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        ensure!(self.n_estimators > 0, "{name}.n_estimators must be > 0");
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "{name}.learning_rate must be > 0"
        );
        ensure!(self.max_depth > 0, "{name}.max_depth must be > 0");
        ensure!(self.lambda >= 0.0, "{name}.lambda must be >= 0");
        ensure!(self.gamma >= 0.0, "{name}.gamma must be >= 0");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub hidden: Vec<usize>,
    /// dropout rate applied after each hidden layer (0 = none)
    pub dropout: Vec<f64>,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            hidden: vec![64, 32, 16],
            dropout: vec![0.2, 0.2, 0.0],
            learning_rate: 0.001,
            epochs: 100,
            batch_size: 32,
            validation_split: 0.2,
        }
    }
}

impl NetworkParams {
    fn validate(&self) -> Result<()> {
        ensure!(!self.hidden.is_empty(), "neural_network.hidden must not be empty");
        ensure!(
            self.dropout.len() == self.hidden.len(),
            "neural_network.dropout has {} entries for {} hidden layers",
            self.dropout.len(),
            self.hidden.len()
        );
        ensure!(
            self.dropout.iter().all(|p| (0.0..1.0).contains(p)),
            "neural_network.dropout rates must be in [0, 1)"
        );
        ensure!(self.batch_size > 0, "neural_network.batch_size must be > 0");
        ensure!(
            (0.0..1.0).contains(&self.validation_split),
            "neural_network.validation_split must be in [0, 1)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.n_features, 20);
        assert_eq!(cfg.training.seed, 42);
        assert!((cfg.approval_threshold - 50_000.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_threshold_and_split() {
        let mut cfg = Config::default();
        cfg.approval_threshold = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.training.test_fraction = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.training.n_samples = 1;
        assert!(cfg.validate().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_vars(vars(&[
            ("UNDERWRITING_BIND_ADDR", "0.0.0.0:8080"),
            ("UNDERWRITING_MODEL_DIR", "/var/lib/underwriting"),
            ("UNDERWRITING_APPROVAL_THRESHOLD", " 42000.5 "),
            ("UNDERWRITING_TRAIN_SAMPLES", "500"),
            ("UNDERWRITING_SEED", "7"),
        ]));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.model_dir, PathBuf::from("/var/lib/underwriting"));
        assert_eq!(cfg.approval_threshold, 42_000.5);
        assert_eq!(cfg.training.n_samples, 500);
        assert_eq!(cfg.training.seed, 7);
    }

    #[test]
    fn unparsable_overrides_are_ignored() {
        let cfg = Config::from_vars(vars(&[
            ("UNDERWRITING_BIND_ADDR", "not-an-addr"),
            ("UNDERWRITING_MODEL_DIR", "   "),
            ("UNDERWRITING_APPROVAL_THRESHOLD", "abc"),
            ("UNDERWRITING_TRAIN_SAMPLES", "-3"),
            ("UNDERWRITING_SEED", "7"),
        ]));
        let d = Config::default();
        assert_eq!(cfg.bind_addr, d.bind_addr);
        assert_eq!(cfg.model_dir, d.model_dir);
        assert_eq!(cfg.approval_threshold, 50_000.0);
        assert_eq!(cfg.training.n_samples, d.training.n_samples);
        assert_eq!(cfg.training.seed, 7);
    }

    #[test]
    fn from_env_reads_process_environment() {
        // only this test touches UNDERWRITING_TRAIN_SAMPLES in-process
        std::env::set_var("UNDERWRITING_TRAIN_SAMPLES", "1234");
        let cfg = Config::from_env();
        std::env::remove_var("UNDERWRITING_TRAIN_SAMPLES");
        assert_eq!(cfg.training.n_samples, 1234);
    }

    #[test]
    fn rejects_non_positive_noise() {
        let mut cfg = Config::default();
        cfg.training.noise_std = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_dropout() {
        let mut cfg = Config::default();
        cfg.training.neural_network.dropout = vec![0.2];
        assert!(cfg.validate().is_err());
    }
}
