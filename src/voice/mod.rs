//! Voice biometrics: enrollment and verification
//!
//! Both sides share the capability bundle and the normalization step, so
//! enrollment and verification features are always produced the same way.

pub mod enrollment;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;

pub use enrollment::{EnrollmentManager, EnrollmentOutcome};
pub use verification::{
    LivenessStatus, RejectReason, VerificationOutcome, VerificationPipeline, VerificationStage,
};

use crate::audio::{self, Pcm, RawAudio};
use crate::capabilities::{FeatureExtractor, FeatureSet, LivenessClassifier, ModelTrainer};
use crate::error::{AuthError, AuthResult, Capability};
use std::sync::Arc;

/// External capabilities used by enrollment and verification
#[derive(Clone)]
pub struct VoiceCapabilities {
    pub extractor: Arc<dyn FeatureExtractor>,
    pub trainer: Arc<dyn ModelTrainer>,
    /// `None` behaves like a classifier that never returns a verdict
    pub liveness: Option<Arc<dyn LivenessClassifier>>,
}

/// Normalize a sample for analysis
pub(crate) fn normalize_sample(sample: &RawAudio) -> AuthResult<Pcm> {
    audio::normalize(sample).map_err(|e| AuthError::InvalidAudio(format!("{:#}", e)))
}

/// Extract features from an already-normalized sample
pub(crate) fn extract_features(
    extractor: &dyn FeatureExtractor,
    pcm: &Pcm,
) -> AuthResult<FeatureSet> {
    extractor
        .extract(pcm)
        .map_err(|e| AuthError::capability(Capability::FeatureExtractor, e))
}
