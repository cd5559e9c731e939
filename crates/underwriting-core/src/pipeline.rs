use crate::{
    artifacts::ModelSet,
    config::Config,
    ensemble::{confidence, decide, ensemble_mean},
    error::UnderwritingError,
    features::{FeatureExtractor, RandomFeatureExtractor},
    model::Regressor,
    schema::{Document, ModelPredictions, NewDocument, UnderwritingResult},
    store::Store,
    util::now_us,
};

use anyhow::{ensure, Result};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppCore {
    pub cfg: Config,
    pub models: Arc<ModelSet>,
    pub store: Arc<Store>,
    pub extractor: Arc<dyn FeatureExtractor>,
}

impl AppCore {
    pub fn new(cfg: Config, models: ModelSet) -> Result<Self> {
        let extractor = Arc::new(RandomFeatureExtractor::new(cfg.n_features));
        Self::with_extractor(cfg, models, extractor)
    }

    /// Fails if the extractor's width differs from what the models were trained on.
    pub fn with_extractor(
        cfg: Config,
        models: ModelSet,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Result<Self> {
        ensure!(
            extractor.n_features() == models.n_features(),
            "feature extractor emits {} features but models expect {}",
            extractor.n_features(),
            models.n_features()
        );
        Ok(Self {
            cfg,
            models: Arc::new(models),
            store: Arc::new(Store::new()),
            extractor,
        })
    }

    pub fn register_user(&self, user_id: &str) -> Result<(), UnderwritingError> {
        self.store.register_user(user_id)?;
        tracing::info!(user_id, "user registered");
        Ok(())
    }

    pub fn add_document(&self, user_id: &str, doc: NewDocument) -> Result<Document, UnderwritingError> {
        let stored = self.store.add_document(user_id, doc)?;
        tracing::info!(user_id, document_id = %stored.document_id, "document stored");
        Ok(stored)
    }

    pub fn user_documents(&self, user_id: &str) -> Result<Vec<Document>, UnderwritingError> {
        self.store
            .user_documents(user_id)
            .ok_or_else(|| UnderwritingError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// documents -> features -> scale -> 4 models -> mean / confidence -> status, stored per user.
    pub fn process_underwriting(&self, user_id: &str) -> Result<UnderwritingResult, UnderwritingError> {
        let t0 = Instant::now();

        let docs = self.user_documents(user_id)?;

        // feature
        let t_feat = Instant::now();
        let raw = self.extractor.extract(&docs);
        metrics::histogram!("stage_feature_us").record(now_us(t_feat) as f64);

        // scale
        let t_scale = Instant::now();
        let row = self
            .models
            .scaler
            .transform_row(&raw)
            .map_err(UnderwritingError::model)?;
        metrics::histogram!("stage_scale_us").record(now_us(t_scale) as f64);

        // predict
        let t_pred = Instant::now();
        let m = &self.models;
        let predict = |r: &dyn Regressor| r.predict_row(&row).map_err(UnderwritingError::model);
        let preds = ModelPredictions {
            random_forest: predict(&m.random_forest)?,
            gradient_boosting: predict(&m.gradient_boosting)?,
            xgboost: predict(&m.xgboost)?,
            neural_network: predict(&m.neural_network)?,
        };
        metrics::histogram!("stage_predict_us").record(now_us(t_pred) as f64);

        // decision
        let conf = confidence(&preds)?;
        let quotation = ensemble_mean(&preds);
        let status = decide(quotation, self.cfg.approval_threshold);

        let result = UnderwritingResult {
            status,
            quotation,
            confidence: conf,
            model_predictions: preds,
        };
        self.store.put_result(user_id, result.clone());

        metrics::counter!("underwriting_processed_total", "status" => status.as_str()).increment(1);
        metrics::histogram!("e2e_us").record(now_us(t0) as f64);
        tracing::info!(
            user_id,
            documents = docs.len(),
            status = status.as_str(),
            quotation,
            confidence = conf,
            "underwriting processed"
        );

        Ok(result)
    }

    pub fn underwriting_result(&self, user_id: &str) -> Result<UnderwritingResult, UnderwritingError> {
        self.store
            .result(user_id)
            .ok_or_else(|| UnderwritingError::ResultNotFound {
                user_id: user_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::schema::Status;

    fn core(threshold: f64) -> AppCore {
        let cfg = Config {
            n_features: 4,
            approval_threshold: threshold,
            training: TrainingConfig::small(200),
            ..Config::default()
        };
        let (models, _) = ModelSet::train(&cfg.training, cfg.n_features).unwrap();
        let ex = Arc::new(RandomFeatureExtractor::seeded(cfg.n_features, 5));
        AppCore::with_extractor(cfg, models, ex).unwrap()
    }

    #[test]
    fn mismatched_extractor_is_rejected() {
        let cfg = Config {
            n_features: 4,
            training: TrainingConfig::small(200),
            ..Config::default()
        };
        let (models, _) = ModelSet::train(&cfg.training, cfg.n_features).unwrap();
        let ex = Arc::new(RandomFeatureExtractor::seeded(5, 1));
        let err = AppCore::with_extractor(cfg, models, ex).err().unwrap();
        assert!(err.to_string().contains("5 features"), "{err}");
    }

    #[test]
    fn unknown_user_is_not_found() {
        let c = core(50_000.0);
        assert!(matches!(
            c.process_underwriting("ghost"),
            Err(UnderwritingError::UserNotFound { .. })
        ));
        assert!(matches!(
            c.underwriting_result("ghost"),
            Err(UnderwritingError::ResultNotFound { .. })
        ));
    }

    #[test]
    fn processes_and_stores_result() {
        let c = core(50_000.0);
        c.register_user("alice").unwrap();
        c.add_document(
            "alice",
            NewDocument {
                document_id: None,
                name: "id.pdf".into(),
                content: String::new(),
            },
        )
        .unwrap();

        let r = c.process_underwriting("alice").unwrap();
        let p = r.model_predictions.as_array();
        assert!((r.quotation - p.iter().sum::<f64>() / 4.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&r.confidence));
        assert_eq!(r.status == Status::Approved, r.quotation <= 50_000.0);

        assert_eq!(c.underwriting_result("alice").unwrap(), r);
    }

    #[test]
    fn user_without_documents_is_still_scored() {
        let c = core(50_000.0);
        c.register_user("bob").unwrap();
        assert!(c.process_underwriting("bob").is_ok());
    }

    #[test]
    fn threshold_drives_status() {
        // synthetic targets are all > 1e4 * e^-1, so a tiny threshold always denies
        let c = core(1.0);
        c.register_user("carol").unwrap();
        assert_eq!(c.process_underwriting("carol").unwrap().status, Status::Denied);
    }
}
