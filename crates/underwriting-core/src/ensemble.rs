use crate::error::UnderwritingError;
use crate::schema::{ModelPredictions, Status};
use crate::util::clamp01;
use statrs::statistics::Statistics;

/// Unweighted mean of the member predictions.
pub fn ensemble_mean(preds: &ModelPredictions) -> f64 {
    preds.as_array().iter().mean()
}

/// Agreement heuristic: `1 - var / ((max - min)^2 / 4)`.
///
/// The population variance of values in `[min, max]` never exceeds
/// `(max - min)^2 / 4`, so the result lies in [0, 1]. Identical predictions
/// are full agreement (1.0).
pub fn confidence(preds: &ModelPredictions) -> Result<f64, UnderwritingError> {
    const NAMES: [&str; 4] = ["random_forest", "gradient_boosting", "xgboost", "neural_network"];
    let xs = preds.as_array();
    if let Some((name, _)) = NAMES.iter().zip(xs).find(|(_, v)| !v.is_finite()) {
        return Err(UnderwritingError::NonFinitePrediction { model: *name });
    }

    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max_variance = (max - min) * (max - min) / 4.0;
    if max_variance <= 0.0 {
        return Ok(1.0);
    }
    // 浮点误差可能略微越界
    Ok(clamp01(1.0 - xs.iter().population_variance() / max_variance))
}

pub fn decide(quotation: f64, threshold: f64) -> Status {
    if quotation <= threshold {
        Status::Approved
    } else {
        Status::Denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preds(a: f64, b: f64, c: f64, d: f64) -> ModelPredictions {
        ModelPredictions {
            random_forest: a,
            gradient_boosting: b,
            xgboost: c,
            neural_network: d,
        }
    }

    #[test]
    fn mean_of_four() {
        assert!((ensemble_mean(&preds(10.0, 20.0, 30.0, 40.0)) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn confidence_extremes() {
        // two at each end: variance hits the bound
        assert!(confidence(&preds(0.0, 0.0, 10.0, 10.0)).unwrap().abs() < 1e-12);
        // identical predictions
        assert_eq!(confidence(&preds(5.0, 5.0, 5.0, 5.0)).unwrap(), 1.0);
    }

    #[test]
    fn confidence_single_outlier() {
        // var = 3/16 * r^2, bound = r^2 / 4  ->  1 - 3/4
        let c = confidence(&preds(0.0, 0.0, 0.0, 4.0)).unwrap();
        assert!((c - 0.25).abs() < 1e-12);

        let c = confidence(&preds(40_000.0, 41_000.0, 40_500.0, 39_800.0)).unwrap();
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn non_finite_prediction_is_an_error() {
        let err = confidence(&preds(1.0, f64::NAN, 2.0, 3.0)).unwrap_err();
        assert!(matches!(
            err,
            UnderwritingError::NonFinitePrediction { model: "gradient_boosting" }
        ));
    }

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(decide(50_000.0, 50_000.0), Status::Approved);
        assert_eq!(decide(50_000.01, 50_000.0), Status::Denied);
        assert_eq!(decide(1.0, 50_000.0), Status::Approved);
    }
}
