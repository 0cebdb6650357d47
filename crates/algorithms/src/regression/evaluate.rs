//! Fit quality and feature importance of a trained model
//!
//! RMSE is measured on the rows the model was trained on, so it reports
//! in-sample fit, not generalisation.

use super::forest::TrainedModel;
use crate::sampling::SampleSet;
use agbmap_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Importance of one predictor band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub band: String,
    /// Raw split-quality score
    pub raw: f64,
    /// Share of the total, in percent
    pub percent: f64,
}

/// Evaluation of one period's model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub rmse: f64,
    pub importance: Vec<FeatureImportance>,
    /// (observed, predicted) per labelled training row
    pub observed_vs_predicted: Vec<(f64, f64)>,
}

/// Root mean squared error of paired slices
pub fn rmse(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    if observed.len() != predicted.len() {
        return Err(Error::InvalidParameter {
            name: "predicted",
            value: predicted.len().to_string(),
            reason: format!("expected {} values", observed.len()),
        });
    }
    if observed.is_empty() {
        return Err(Error::InsufficientTrainingData { rows: 0, min: 1 });
    }
    let sse: f64 = observed
        .iter()
        .zip(predicted)
        .map(|(o, p)| (o - p) * (o - p))
        .sum();
    Ok((sse / observed.len() as f64).sqrt())
}

/// Scale raw importances to percentages of their sum.
///
/// A zero (or non-finite) sum gives 0 % for every band.
pub fn normalize_importance(raw: &[(String, f64)]) -> Vec<FeatureImportance> {
    let total: f64 = raw.iter().map(|(_, v)| v).sum();
    let usable = total.is_finite() && total > 0.0;
    raw.iter()
        .map(|(band, value)| FeatureImportance {
            band: band.clone(),
            raw: *value,
            percent: if usable { 100.0 * value / total } else { 0.0 },
        })
        .collect()
}

/// Evaluate `model` on the labelled rows of `samples`
pub fn evaluate(model: &TrainedModel, samples: &SampleSet) -> Result<Evaluation> {
    let predicted_all = model.predict_samples(samples)?;
    let observed_vs_predicted: Vec<(f64, f64)> = samples
        .samples
        .iter()
        .zip(predicted_all)
        .filter_map(|(s, p)| s.label.filter(|l| l.is_finite()).map(|l| (l, p)))
        .collect();

    let (observed, predicted): (Vec<f64>, Vec<f64>) = observed_vs_predicted.iter().copied().unzip();
    Ok(Evaluation {
        rmse: rmse(&observed, &predicted)?,
        importance: normalize_importance(&model.explain()),
        observed_vs_predicted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::{train, ForestParams};
    use crate::sampling::TrainingSample;
    use agbmap_parallel::ComputeBudget;
    use approx::assert_relative_eq;

    #[test]
    fn test_rmse() {
        assert_relative_eq!(rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap(), 0.0);
        assert_relative_eq!(rmse(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 12.5f64.sqrt());
        assert!(rmse(&[1.0], &[]).is_err());
        assert!(rmse(&[], &[]).is_err());
    }

    #[test]
    fn test_normalize_sums_to_100() {
        let raw = vec![("ndvi".to_string(), 3.0), ("slope".to_string(), 1.0), ("dem".to_string(), 0.0)];
        let norm = normalize_importance(&raw);
        assert_relative_eq!(norm[0].percent, 75.0);
        assert_relative_eq!(norm[1].percent, 25.0);
        assert_eq!(norm[2].percent, 0.0);
        let total: f64 = norm.iter().map(|f| f.percent).sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_zero_sum() {
        let raw = vec![("ndvi".to_string(), 0.0), ("slope".to_string(), 0.0)];
        assert!(normalize_importance(&raw).iter().all(|f| f.percent == 0.0));
    }

    #[test]
    fn test_evaluate_in_sample() {
        let set = SampleSet {
            predictors: vec!["ndvi".into()],
            label: "agbd".into(),
            samples: (0..30)
                .map(|i| TrainingSample {
                    features: vec![i as f64],
                    label: if i % 10 == 9 { None } else { Some(2.0 * i as f64) },
                    class: u8::from(i % 10 != 9),
                    row: i,
                    col: 0,
                })
                .collect(),
        };
        let model = train(&set, &ForestParams::default(), &ComputeBudget::default()).unwrap();
        let eval = evaluate(&model, &set).unwrap();

        assert_eq!(eval.observed_vs_predicted.len(), 27);
        assert!(eval.rmse >= 0.0);
        assert_eq!(eval.importance.len(), 1);
        assert_relative_eq!(eval.importance[0].percent, 100.0, epsilon = 1e-6);
    }
}
