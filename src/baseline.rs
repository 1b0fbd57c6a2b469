//! Per-user baseline statistics and the acceptance threshold derived from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mean/std of a user's enrollment frames scored against their own fresh model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStatistics {
    pub mean_score: f64,
    pub std_score: f64,
    pub computed_at: DateTime<Utc>,
}

impl BaselineStatistics {
    /// Population mean and standard deviation (divisor n) of per-frame scores
    ///
    /// Returns `None` for an empty slice or when any score is not finite.
    pub fn from_scores(scores: &[f64], computed_at: DateTime<Utc>) -> Option<Self> {
        if scores.is_empty() || scores.iter().any(|s| !s.is_finite()) {
            return None;
        }

        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            mean_score: mean,
            std_score: variance.sqrt(),
            computed_at,
        })
    }
}

/// Where a verification threshold came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    /// Calibrated from the user's baseline
    Adaptive,
    /// Baseline missing; fixed default used
    FallbackDefault,
}

/// Threshold policy: `mean_score - margin`, or a fixed default without a baseline
///
/// `std_score` is not consulted: a noisy enrollment must not loosen
/// the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub margin: f64,
    pub default_threshold: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            margin: 5.0,
            default_threshold: -35.0,
        }
    }
}

impl ThresholdPolicy {
    pub fn threshold(&self, baseline: Option<&BaselineStatistics>) -> (f64, ThresholdSource) {
        match baseline {
            Some(stats) => (stats.mean_score - self.margin, ThresholdSource::Adaptive),
            None => (self.default_threshold, ThresholdSource::FallbackDefault),
        }
    }

    /// Strict comparison: a score equal to the threshold is rejected
    pub fn accepts(score: f64, threshold: f64) -> bool {
        score > threshold
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn mean_lies_within_score_range(scores in prop::collection::vec(-200.0f64..0.0, 1..64)) {
            let stats = BaselineStatistics::from_scores(&scores, Utc::now()).unwrap();
            let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(stats.mean_score >= min - 1e-9 && stats.mean_score <= max + 1e-9);
            prop_assert!(stats.std_score >= 0.0);
        }

        #[test]
        fn threshold_exactly_margin_below_mean(mean in -500.0f64..500.0, margin in 0.0f64..50.0) {
            let stats = BaselineStatistics { mean_score: mean, std_score: 1.0, computed_at: Utc::now() };
            let policy = ThresholdPolicy { margin, default_threshold: -35.0 };
            let (threshold, _) = policy.threshold(Some(&stats));
            prop_assert_eq!(threshold, mean - margin);
            prop_assert!(!ThresholdPolicy::accepts(threshold, threshold));
        }
    }
}
