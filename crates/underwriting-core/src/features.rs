use crate::schema::Document;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Turns a user's documents into one raw (unscaled) feature row.
pub trait FeatureExtractor: Send + Sync {
    fn n_features(&self) -> usize;
    fn extract(&self, docs: &[Document]) -> Vec<f64>;
}

/// Placeholder extractor: ignores document content and draws uniform [0, 1) features.
#[derive(Debug)]
pub struct RandomFeatureExtractor {
    n_features: usize,
    rng: Option<Mutex<StdRng>>,
}

impl RandomFeatureExtractor {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            rng: None,
        }
    }

    /// Deterministic stream, for tests and replay.
    pub fn seeded(n_features: usize, seed: u64) -> Self {
        Self {
            n_features,
            rng: Some(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl FeatureExtractor for RandomFeatureExtractor {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn extract(&self, _docs: &[Document]) -> Vec<f64> {
        match &self.rng {
            Some(rng) => {
                let mut rng = rng.lock();
                (0..self.n_features).map(|_| rng.gen::<f64>()).collect()
            }
            None => {
                let mut rng = rand::thread_rng();
                (0..self.n_features).map(|_| rng.gen::<f64>()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_configured_width_in_unit_range() {
        let ex = RandomFeatureExtractor::new(20);
        let row = ex.extract(&[]);
        assert_eq!(row.len(), 20);
        assert!(row.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn seeded_extractors_agree() {
        let a = RandomFeatureExtractor::seeded(8, 11);
        let b = RandomFeatureExtractor::seeded(8, 11);
        let first = a.extract(&[]);
        assert_eq!(first, b.extract(&[]));
        // the stream advances
        assert_ne!(first, a.extract(&[]));
    }
}
