//! External capabilities consumed by the authentication core
//!
//! Feature extraction, model training/scoring, liveness classification and code
//! delivery are collaborators behind these traits. The core sequences them and
//! never looks inside. Implementations report failures through `anyhow` and the
//! core maps them onto typed errors.
//!
//! A development implementation lives in [`stub`]; production deployments plug
//! in their own.

use crate::audio::Pcm;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod stub;

/// Frame-level acoustic features (one vector per analysis frame)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    frames: Vec<Vec<f64>>,
}

impl FeatureSet {
    pub fn new(frames: Vec<Vec<f64>>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Vec<f64>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Feature dimension, if any frame exists
    pub fn dim(&self) -> Option<usize> {
        self.frames.first().map(|f| f.len())
    }

    /// Append another set's frames (enrollment concatenation)
    pub fn extend(&mut self, other: FeatureSet) {
        self.frames.extend(other.frames);
    }
}

/// Reference to the speaker-independent background model used as adaptation prior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackgroundModelRef {
    pub path: PathBuf,
}

/// Deterministic feature extraction over a normalized signal
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, pcm: &Pcm) -> Result<FeatureSet>;
}

/// A trained per-user voice model
pub trait VoiceModel: Send + Sync {
    /// Per-frame log-likelihoods
    fn score_each(&self, features: &FeatureSet) -> Result<Vec<f64>>;

    /// Average log-likelihood over all frames
    fn score(&self, features: &FeatureSet) -> Result<f64> {
        let scores = self.score_each(features)?;
        if scores.is_empty() {
            bail!("Cannot score an empty feature set");
        }
        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Serialized form for persistence; [`ModelTrainer::load`] must accept it
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// Trains (adapts) per-user models and restores them from storage
pub trait ModelTrainer: Send + Sync {
    fn train(
        &self,
        features: &FeatureSet,
        background: &BackgroundModelRef,
        components: usize,
    ) -> Result<Box<dyn VoiceModel>>;

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn VoiceModel>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LivenessPrediction {
    Real,
    Fake,
}

/// Liveness classifier verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessVerdict {
    pub prediction: LivenessPrediction,
    pub confidence: f32,
}

/// Anti-spoofing classifier
///
/// `Ok(None)` means the classifier ran but produced no verdict.
pub trait LivenessClassifier: Send + Sync {
    fn classify(&self, pcm: &Pcm, cutoff_hz: u32) -> Result<Option<LivenessVerdict>>;
}

/// Out-of-band delivery of a one-time code to its subject
pub trait CodeNotifier: Send + Sync {
    fn deliver(&self, subject: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(Vec<f64>);

    impl VoiceModel for Constant {
        fn score_each(&self, _features: &FeatureSet) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }

        fn to_bytes(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_default_score_is_frame_average() {
        let model = Constant(vec![-18.0, -22.0]);
        let score = model.score(&FeatureSet::default()).unwrap();
        assert!((score + 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_default_score_rejects_empty() {
        assert!(Constant(Vec::new()).score(&FeatureSet::default()).is_err());
    }

    #[test]
    fn test_feature_set_extend() {
        let mut a = FeatureSet::new(vec![vec![1.0, 2.0]]);
        a.extend(FeatureSet::new(vec![vec![3.0, 4.0], vec![5.0, 6.0]]));
        assert_eq!(a.len(), 3);
        assert_eq!(a.dim(), Some(2));
        assert_eq!(a.frames()[2], vec![5.0, 6.0]);
    }

    #[test]
    fn test_liveness_prediction_wire_format() {
        let json = serde_json::to_string(&LivenessPrediction::Fake).unwrap();
        assert_eq!(json, "\"FAKE\"");
    }
}
