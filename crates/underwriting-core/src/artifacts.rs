//! Model provisioning: load the persisted ensemble, or train and persist a new one.
//!
//! Artifacts are gzip'd JSON, one file per model plus the feature scaler.

use crate::boosting::{BoostedTrees, GradientBoosting};
use crate::config::{Config, TrainingConfig};
use crate::dataset::{synthesize, train_test_split};
use crate::evaluation::{evaluate, Evaluation};
use crate::forest::RandomForest;
use crate::model::Regressor;
use crate::neural::NeuralNetwork;
use crate::scaler::StandardScaler;
use anyhow::{ensure, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

pub const RF_FILE: &str = "rf_underwriting_model.json.gz";
pub const GB_FILE: &str = "gb_underwriting_model.json.gz";
pub const XGB_FILE: &str = "xgb_underwriting_model.json.gz";
pub const NN_FILE: &str = "nn_underwriting_model.json.gz";
pub const SCALER_FILE: &str = "feature_scaler.json.gz";

pub const ARTIFACT_FILES: [&str; 5] = [RF_FILE, GB_FILE, XGB_FILE, NN_FILE, SCALER_FILE];

/// The four ensemble members plus the scaler they were trained behind.
#[derive(Debug)]
pub struct ModelSet {
    pub scaler: StandardScaler,
    pub random_forest: RandomForest,
    pub gradient_boosting: GradientBoosting,
    pub xgboost: BoostedTrees,
    pub neural_network: NeuralNetwork,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub random_forest: Evaluation,
    pub gradient_boosting: Evaluation,
    pub xgboost: Evaluation,
    pub neural_network: Evaluation,
}

impl TrainingReport {
    pub fn entries(&self) -> [(&'static str, Evaluation); 4] {
        [
            ("random_forest", self.random_forest),
            ("gradient_boosting", self.gradient_boosting),
            ("xgboost", self.xgboost),
            ("neural_network", self.neural_network),
        ]
    }

    pub fn log(&self) {
        for (name, e) in self.entries() {
            tracing::info!(
                model = name,
                "{name} mse={:.2} mae={:.2} r2={:.2}",
                e.mse,
                e.mae,
                e.r2
            );
        }
    }
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let p = dir.join(name);
    let f = fs::File::open(&p).with_context(|| format!("open {name}: {}", p.display()))?;
    let dec = GzDecoder::new(BufReader::new(f));
    serde_json::from_reader(dec).with_context(|| format!("parse {name}: {}", p.display()))
}

/// Write to `<name>.tmp`, then rename into place.
fn write_artifact<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let p = dir.join(name);
    let tmp = dir.join(format!("{name}.tmp"));
    {
        let f = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let mut enc = GzEncoder::new(BufWriter::new(f), Compression::default());
        serde_json::to_writer(&mut enc, value).with_context(|| format!("encode {name}"))?;
        let mut w = enc.finish().with_context(|| format!("finish gzip {name}"))?;
        w.flush().with_context(|| format!("flush {}", tmp.display()))?;
    }
    fs::rename(&tmp, &p).with_context(|| format!("rename {} -> {}", tmp.display(), p.display()))?;
    Ok(())
}

impl ModelSet {
    pub fn members(&self) -> [&dyn Regressor; 4] {
        [
            &self.random_forest,
            &self.gradient_boosting,
            &self.xgboost,
            &self.neural_network,
        ]
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Every model must accept exactly what the scaler emits.
    pub fn check_consistent(&self) -> Result<()> {
        let width = self.scaler.n_features();
        for m in self.members() {
            ensure!(
                m.n_features() == width,
                "{} expects {} features but scaler has {}",
                m.name(),
                m.n_features(),
                width
            );
        }
        Ok(())
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let set = Self {
            scaler: read_artifact(dir, SCALER_FILE)?,
            random_forest: read_artifact(dir, RF_FILE)?,
            gradient_boosting: read_artifact(dir, GB_FILE)?,
            xgboost: read_artifact(dir, XGB_FILE)?,
            neural_network: read_artifact(dir, NN_FILE)?,
        };
        set.check_consistent()
            .with_context(|| format!("inconsistent artifacts in {}", dir.display()))?;
        Ok(set)
    }

    pub fn save_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("create model_dir: {}", dir.display()))?;
        write_artifact(dir, RF_FILE, &self.random_forest)?;
        write_artifact(dir, GB_FILE, &self.gradient_boosting)?;
        write_artifact(dir, XGB_FILE, &self.xgboost)?;
        write_artifact(dir, NN_FILE, &self.neural_network)?;
        write_artifact(dir, SCALER_FILE, &self.scaler)?;
        Ok(())
    }

    /// Synthesise, split, scale, fit all four, evaluate on the held-out split.
    pub fn train(cfg: &TrainingConfig, n_features: usize) -> Result<(Self, TrainingReport)> {
        cfg.validate()?;
        ensure!(n_features > 0, "n_features must be > 0");

        let data = synthesize(cfg, n_features)?;
        let split = train_test_split(&data, cfg.test_fraction, cfg.seed);
        tracing::info!(
            train = split.train.len(),
            test = split.test.len(),
            n_features,
            "synthesised training set"
        );

        let scaler = StandardScaler::fit(&split.train.x).context("fit scaler")?;
        let x_train = scaler.transform(&split.train.x)?;
        let x_test = scaler.transform(&split.test.x)?;
        let y_train = &split.train.y;

        // smartcore scans every feature at every node with unbounded depth: at the
        // default 200 trees x 8000 rows this is several minutes in release builds
        tracing::info!(
            n_trees = cfg.forest.n_trees,
            rows = x_train.len(),
            n_features,
            "training random forest (slowest member)"
        );
        let t = Instant::now();
        let random_forest =
            RandomForest::fit(&x_train, y_train, &cfg.forest, cfg.seed).context("train random forest")?;
        tracing::info!(elapsed_ms = t.elapsed().as_millis() as u64, "random_forest trained");

        let t = Instant::now();
        let gradient_boosting = GradientBoosting::fit(&x_train, y_train, &cfg.gradient_boosting)
            .context("train gradient boosting")?;
        tracing::info!(elapsed_ms = t.elapsed().as_millis() as u64, "gradient_boosting trained");

        let t = Instant::now();
        let xgboost =
            BoostedTrees::fit(&x_train, y_train, &cfg.boosted_trees).context("train boosted trees")?;
        tracing::info!(elapsed_ms = t.elapsed().as_millis() as u64, "xgboost trained");

        let t = Instant::now();
        let neural_network = NeuralNetwork::fit(&x_train, y_train, &cfg.neural_network, cfg.seed)
            .context("train neural network")?;
        tracing::info!(elapsed_ms = t.elapsed().as_millis() as u64, "neural_network trained");

        let set = Self {
            scaler,
            random_forest,
            gradient_boosting,
            xgboost,
            neural_network,
        };
        let report = set.evaluate(&x_test, &split.test.y)?;
        Ok((set, report))
    }

    /// Evaluate all four members on already-scaled rows.
    pub fn evaluate(&self, x_scaled: &[Vec<f64>], y: &[f64]) -> Result<TrainingReport> {
        Ok(TrainingReport {
            random_forest: evaluate(&self.random_forest, x_scaled, y)?,
            gradient_boosting: evaluate(&self.gradient_boosting, x_scaled, y)?,
            xgboost: evaluate(&self.xgboost, x_scaled, y)?,
            neural_network: evaluate(&self.neural_network, x_scaled, y)?,
        })
    }
}

/// Load-or-train. Only a training failure is fatal; a failed save is logged and
/// the freshly trained set is still served.
pub fn provision(cfg: &Config) -> Result<ModelSet> {
    let dir = cfg.model_dir.as_path();
    match ModelSet::load_from_dir(dir) {
        Ok(set) if set.n_features() == cfg.n_features => {
            tracing::info!(model_dir = %dir.display(), "loaded persisted models");
            return Ok(set);
        }
        Ok(set) => {
            tracing::warn!(
                model_dir = %dir.display(),
                persisted = set.n_features(),
                configured = cfg.n_features,
                "persisted models have a different feature width; retraining"
            );
        }
        Err(e) => {
            tracing::warn!(model_dir = %dir.display(), err = %format!("{e:#}"), "cannot load persisted models");
        }
    }

    tracing::info!("training new models");
    let (set, report) =
        ModelSet::train(&cfg.training, cfg.n_features).context("model training failed")?;
    report.log();

    if let Err(e) = set.save_to_dir(dir) {
        tracing::error!(model_dir = %dir.display(), err = %format!("{e:#}"), "failed to persist models");
    } else {
        tracing::info!(model_dir = %dir.display(), "models persisted");
    }
    Ok(set)
}

/// Where an offline run's models came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Loaded,
    Trained,
}

/// Offline counterpart of [`provision`]: without `force`, loadable artifacts are
/// re-evaluated on a freshly synthesised test split; otherwise train and save.
/// Unlike `provision`, a failed save is an error.
pub fn train_or_evaluate(cfg: &Config, force: bool) -> Result<(Provenance, TrainingReport)> {
    let dir = cfg.model_dir.as_path();
    if !force {
        match ModelSet::load_from_dir(dir) {
            Ok(set) => {
                let data = synthesize(&cfg.training, set.n_features())?;
                let split = train_test_split(&data, cfg.training.test_fraction, cfg.training.seed);
                let x_test = set.scaler.transform(&split.test.x)?;
                let report = set.evaluate(&x_test, &split.test.y)?;
                return Ok((Provenance::Loaded, report));
            }
            Err(e) => {
                tracing::warn!(err = %format!("{e:#}"), "no usable artifacts, training");
            }
        }
    }

    let (set, report) = ModelSet::train(&cfg.training, cfg.n_features)?;
    set.save_to_dir(dir)
        .with_context(|| format!("save models to {}", dir.display()))?;
    Ok((Provenance::Trained, report))
}
