//! Stub capabilities for development without the production models
//!
//! Provides an energy-based frame feature extractor, a single diagonal Gaussian
//! "voice model" MAP-adapted from a background prior, a liveness classifier that
//! never returns a verdict, and a notifier that only logs. Good enough to run the
//! pipeline end to end; not a speaker-recognition system.

use super::{
    BackgroundModelRef, CodeNotifier, FeatureExtractor, FeatureSet, LivenessClassifier,
    LivenessVerdict, ModelTrainer, VoiceModel,
};
use crate::audio::Pcm;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

/// Frame energy features: [ln RMS, zero-crossing rate, ln mean |delta|]
pub struct EnergyFeatureExtractor {
    frame_len: usize,
    hop_len: usize,
    /// Frames with RMS below this are treated as silence and skipped
    silence_rms: f64,
}

impl Default for EnergyFeatureExtractor {
    fn default() -> Self {
        Self {
            frame_len: 1024,
            hop_len: 512,
            silence_rms: 64.0,
        }
    }
}

impl EnergyFeatureExtractor {
    fn frame_features(frame: &[i16]) -> (f64, Vec<f64>) {
        let n = frame.len() as f64;
        let sum_squares: f64 = frame.iter().map(|&s| (s as f64).powi(2)).sum();
        let rms = (sum_squares / n).sqrt();

        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0) != (w[1] >= 0))
            .count() as f64;
        let zcr = crossings / (n - 1.0).max(1.0);

        let delta: f64 = frame
            .windows(2)
            .map(|w| (w[1] as f64 - w[0] as f64).abs())
            .sum::<f64>()
            / (n - 1.0).max(1.0);

        (rms, vec![(rms + 1.0).ln(), zcr, (delta + 1.0).ln()])
    }
}

impl FeatureExtractor for EnergyFeatureExtractor {
    fn extract(&self, pcm: &Pcm) -> Result<FeatureSet> {
        if pcm.samples.len() < self.frame_len {
            return Ok(FeatureSet::default());
        }

        let mut frames = Vec::new();
        let mut skipped = 0usize;
        let mut start = 0;
        while start + self.frame_len <= pcm.samples.len() {
            let (rms, features) =
                Self::frame_features(&pcm.samples[start..start + self.frame_len]);
            if rms >= self.silence_rms {
                frames.push(features);
            } else {
                skipped += 1;
            }
            start += self.hop_len;
        }

        log::trace!(
            "[STUB] Extracted {} frames ({} silent skipped)",
            frames.len(),
            skipped
        );
        Ok(FeatureSet::new(frames))
    }
}

/// Single diagonal Gaussian
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianModel {
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
}

const VARIANCE_FLOOR: f64 = 1e-4;

impl GaussianModel {
    /// Built-in generic prior used when no background model file exists
    pub fn default_prior() -> Self {
        Self {
            mean: vec![7.0, 0.1, 5.0],
            var: vec![4.0, 0.01, 4.0],
        }
    }

    fn frame_log_likelihood(&self, frame: &[f64]) -> Result<f64> {
        if frame.len() != self.mean.len() {
            bail!(
                "Feature dimension mismatch: model {}, frame {}",
                self.mean.len(),
                frame.len()
            );
        }

        let ll = frame
            .iter()
            .zip(self.mean.iter().zip(self.var.iter()))
            .map(|(&x, (&mu, &var))| {
                -0.5 * ((2.0 * std::f64::consts::PI * var).ln() + (x - mu).powi(2) / var)
            })
            .sum();
        Ok(ll)
    }
}

impl VoiceModel for GaussianModel {
    fn score_each(&self, features: &FeatureSet) -> Result<Vec<f64>> {
        features
            .frames()
            .iter()
            .map(|frame| self.frame_log_likelihood(frame))
            .collect()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to serialize Gaussian model")
    }
}

/// MAP adaptation of a diagonal Gaussian from the background prior
pub struct GaussianTrainer {
    /// MAP relevance factor: frames needed before data outweighs the prior
    relevance: f64,
}

impl Default for GaussianTrainer {
    fn default() -> Self {
        Self { relevance: 16.0 }
    }
}

impl GaussianTrainer {
    fn load_prior(background: &BackgroundModelRef) -> Result<GaussianModel> {
        if !background.path.exists() {
            log::debug!(
                "[STUB] Background model {} not found, using built-in prior",
                background.path.display()
            );
            return Ok(GaussianModel::default_prior());
        }

        let bytes = fs::read(&background.path).with_context(|| {
            format!(
                "Failed to read background model: {}",
                background.path.display()
            )
        })?;
        serde_json::from_slice(&bytes).context("Failed to parse background model")
    }
}

impl ModelTrainer for GaussianTrainer {
    fn train(
        &self,
        features: &FeatureSet,
        background: &BackgroundModelRef,
        components: usize,
    ) -> Result<Box<dyn VoiceModel>> {
        let dim = match features.dim() {
            Some(dim) => dim,
            None => bail!("Cannot train on an empty feature set"),
        };

        let prior = Self::load_prior(background)?;
        if prior.mean.len() != dim {
            bail!(
                "Background model dimension {} does not match features {}",
                prior.mean.len(),
                dim
            );
        }

        log::debug!(
            "[STUB] Adapting single Gaussian ({} components requested) on {} frames",
            components,
            features.len()
        );

        let n = features.len() as f64;
        let alpha = n / (n + self.relevance);

        let mut mean = vec![0.0; dim];
        for frame in features.frames() {
            for (acc, &x) in mean.iter_mut().zip(frame.iter()) {
                *acc += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; dim];
        for frame in features.frames() {
            for ((acc, &x), &mu) in var.iter_mut().zip(frame.iter()).zip(mean.iter()) {
                *acc += (x - mu).powi(2);
            }
        }
        var.iter_mut().for_each(|v| *v /= n);

        let adapted = GaussianModel {
            mean: mean
                .iter()
                .zip(prior.mean.iter())
                .map(|(&m, &p)| alpha * m + (1.0 - alpha) * p)
                .collect(),
            var: var
                .iter()
                .zip(prior.var.iter())
                .map(|(&v, &p)| (alpha * v + (1.0 - alpha) * p).max(VARIANCE_FLOOR))
                .collect(),
        };

        Ok(Box::new(adapted))
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn VoiceModel>> {
        let model: GaussianModel =
            serde_json::from_slice(bytes).context("Failed to parse Gaussian model")?;
        if model.mean.len() != model.var.len() {
            bail!("Corrupt Gaussian model: mean/var length mismatch");
        }
        Ok(Box::new(model))
    }
}

/// Liveness classifier placeholder: runs, never decides
pub struct NoVerdictLiveness;

impl LivenessClassifier for NoVerdictLiveness {
    fn classify(&self, _pcm: &Pcm, cutoff_hz: u32) -> Result<Option<LivenessVerdict>> {
        log::trace!("[STUB] Liveness classifier has no model (cutoff {} Hz)", cutoff_hz);
        Ok(None)
    }
}

/// Notifier that writes the code to the log instead of sending it
pub struct LogNotifier;

impl CodeNotifier for LogNotifier {
    fn deliver(&self, subject: &str, code: &str, expires_at: DateTime<Utc>) -> Result<()> {
        log::info!(
            "[STUB] One-time code for {}: {} (valid until {})",
            subject,
            code,
            expires_at.to_rfc3339()
        );
        Ok(())
    }
}
