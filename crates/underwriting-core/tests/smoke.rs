use std::sync::Arc;
use underwriting_core::artifacts::{provision, ARTIFACT_FILES};
use underwriting_core::config::{Config, TrainingConfig};
use underwriting_core::features::RandomFeatureExtractor;
use underwriting_core::pipeline::AppCore;

#[test]
fn provision_then_serve_from_persisted_models() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = Config {
        model_dir: tmp.path().join("models"),
        n_features: 6,
        training: TrainingConfig::small(250),
        ..Config::default()
    };

    // first start: nothing on disk, trains and persists
    let first = provision(&cfg).unwrap();
    for f in ARTIFACT_FILES {
        assert!(cfg.model_dir.join(f).is_file(), "missing {f}");
    }

    // second start: loads, and the same features give the same result
    let second = provision(&cfg).unwrap();
    let a = AppCore::with_extractor(
        cfg.clone(),
        first,
        Arc::new(RandomFeatureExtractor::seeded(cfg.n_features, 99)),
    )
    .unwrap();
    let b = AppCore::with_extractor(
        cfg.clone(),
        second,
        Arc::new(RandomFeatureExtractor::seeded(cfg.n_features, 99)),
    )
    .unwrap();
    for core in [&a, &b] {
        core.register_user("u").unwrap();
    }
    let ra = a.process_underwriting("u").unwrap();
    let rb = b.process_underwriting("u").unwrap();
    assert_eq!(ra.status, rb.status);
    assert!((ra.quotation - rb.quotation).abs() < 1e-6 * ra.quotation.abs().max(1.0));
}
