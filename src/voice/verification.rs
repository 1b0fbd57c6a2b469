//! Verification: liveness first, then speaker match against the adaptive threshold
//!
//! A sample classified as fake never reaches feature extraction or model
//! scoring. The profile is read under the identity's read lock so a concurrent
//! re-enrollment is observed either entirely or not at all.

use super::{extract_features, normalize_sample, VoiceCapabilities};
use crate::audio::{Pcm, RawAudio};
use crate::baseline::{ThresholdPolicy, ThresholdSource};
use crate::capabilities::LivenessPrediction;
use crate::error::{AuthError, AuthResult, Capability};
use crate::locks::IdentityLocks;
use crate::store::{ProfileStore, StoredProfile};
use crate::validation::validate_identity;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Received,
    LivenessCheck,
    SpeakerMatch,
    Accepted,
    Rejected,
}

impl fmt::Display for VerificationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerificationStage::Received => "received",
            VerificationStage::LivenessCheck => "liveness_check",
            VerificationStage::SpeakerMatch => "speaker_match",
            VerificationStage::Accepted => "accepted",
            VerificationStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LivenessFailed,
    ScoreBelowThreshold,
}

impl RejectReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::LivenessFailed => "Liveness check failed: sample classified as fake",
            RejectReason::ScoreBelowThreshold => "Voice does not match enrolled profile",
        }
    }
}

/// What the liveness stage concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessStatus {
    Passed,
    Failed,
    /// No verdict was available and liveness is not required
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub user: String,
    pub accepted: bool,
    /// Absent when the sample was rejected before scoring
    pub score: Option<f64>,
    pub threshold: f64,
    pub threshold_source: ThresholdSource,
    pub reason: Option<RejectReason>,
    pub liveness: LivenessStatus,
    pub liveness_confidence: Option<f32>,
}

pub struct VerificationPipeline {
    store: Arc<dyn ProfileStore>,
    locks: Arc<IdentityLocks>,
    capabilities: VoiceCapabilities,
    policy: ThresholdPolicy,
    liveness_cutoff_hz: u32,
    require_liveness: bool,
}

impl VerificationPipeline {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        locks: Arc<IdentityLocks>,
        capabilities: VoiceCapabilities,
        policy: ThresholdPolicy,
        liveness_cutoff_hz: u32,
        require_liveness: bool,
    ) -> Self {
        Self {
            store,
            locks,
            capabilities,
            policy,
            liveness_cutoff_hz,
            require_liveness,
        }
    }

    pub fn verify(&self, user: &str, sample: &RawAudio) -> AuthResult<VerificationOutcome> {
        validate_identity(user)?;
        log::debug!("Verification for '{}': {}", user, VerificationStage::Received);

        let lock = self.locks.lock_for(user);
        let _guard = lock.read().unwrap_or_else(|e| e.into_inner());

        let profile = self
            .store
            .load(user)
            .map_err(|e| AuthError::capability(Capability::Persistence, e))?
            .ok_or_else(|| AuthError::UserNotEnrolled(user.to_string()))?;

        let (threshold, threshold_source) = self.policy.threshold(profile.baseline.as_ref());
        if threshold_source == ThresholdSource::FallbackDefault {
            log::warn!(
                "No baseline for '{}', using default threshold {:.2}",
                user,
                threshold
            );
        }

        let pcm = normalize_sample(sample)?;

        log::debug!("Verification for '{}': {}", user, VerificationStage::LivenessCheck);
        let (liveness, liveness_confidence) = self.check_liveness(user, &pcm)?;
        if liveness == LivenessStatus::Failed {
            log::info!(
                "Verification for '{}': {} ({})",
                user,
                VerificationStage::Rejected,
                RejectReason::LivenessFailed.message()
            );
            return Ok(VerificationOutcome {
                user: user.to_string(),
                accepted: false,
                score: None,
                threshold,
                threshold_source,
                reason: Some(RejectReason::LivenessFailed),
                liveness,
                liveness_confidence,
            });
        }

        log::debug!("Verification for '{}': {}", user, VerificationStage::SpeakerMatch);
        let score = self.speaker_score(&profile, &pcm)?;
        let accepted = ThresholdPolicy::accepts(score, threshold);
        let stage = if accepted {
            VerificationStage::Accepted
        } else {
            VerificationStage::Rejected
        };

        log::info!(
            "Verification for '{}': {} (score={:.2}, threshold={:.2})",
            user,
            stage,
            score,
            threshold
        );

        Ok(VerificationOutcome {
            user: user.to_string(),
            accepted,
            score: Some(score),
            threshold,
            threshold_source,
            reason: (!accepted).then_some(RejectReason::ScoreBelowThreshold),
            liveness,
            liveness_confidence,
        })
    }

    fn check_liveness(&self, user: &str, pcm: &Pcm) -> AuthResult<(LivenessStatus, Option<f32>)> {
        let verdict = match &self.capabilities.liveness {
            // A classifier that fails never degrades to voice-only
            Some(classifier) => classifier
                .classify(pcm, self.liveness_cutoff_hz)
                .map_err(|e| AuthError::capability(Capability::Liveness, e))?,
            None => None,
        };

        match verdict {
            Some(v) if v.prediction == LivenessPrediction::Real => {
                Ok((LivenessStatus::Passed, Some(v.confidence)))
            }
            Some(v) => Ok((LivenessStatus::Failed, Some(v.confidence))),
            None if self.require_liveness => Err(AuthError::capability(
                Capability::Liveness,
                anyhow!("No liveness verdict available"),
            )),
            None => {
                log::warn!(
                    "No liveness verdict for '{}', continuing with voice match only",
                    user
                );
                Ok((LivenessStatus::Skipped, None))
            }
        }
    }

    fn speaker_score(&self, profile: &StoredProfile, pcm: &Pcm) -> AuthResult<f64> {
        let features = extract_features(self.capabilities.extractor.as_ref(), pcm)?;
        if features.is_empty() {
            return Err(AuthError::NoValidFeatures);
        }

        profile
            .verify_integrity()
            .map_err(|e| AuthError::capability(Capability::Model, e))?;
        let model = self
            .capabilities
            .trainer
            .load(&profile.model)
            .map_err(|e| AuthError::capability(Capability::Model, e))?;

        model
            .score(&features)
            .map_err(|e| AuthError::capability(Capability::Model, e))
    }
}
