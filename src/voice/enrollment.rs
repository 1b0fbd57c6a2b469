//! Enrollment: build and calibrate a voice profile from audio samples
//!
//! The baseline is computed by scoring the enrollment frames against the model
//! that was just trained on them. Nothing is written until the whole profile
//! (model + baseline) exists, so a failed enrollment leaves any prior profile
//! intact.

use super::{extract_features, normalize_sample, VoiceCapabilities};
use crate::audio::RawAudio;
use crate::baseline::BaselineStatistics;
use crate::capabilities::{BackgroundModelRef, FeatureSet};
use crate::clock::Clock;
use crate::error::{AuthError, AuthResult, Capability};
use crate::locks::IdentityLocks;
use crate::store::{ProfileInfo, ProfileStore, StoredProfile};
use crate::validation::validate_identity;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a successful enrollment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentOutcome {
    pub user: String,
    pub profile_created: bool,
    pub baseline: BaselineStatistics,
    pub samples_processed: usize,
    pub feature_frames: usize,
}

pub struct EnrollmentManager {
    store: Arc<dyn ProfileStore>,
    locks: Arc<IdentityLocks>,
    capabilities: VoiceCapabilities,
    background: BackgroundModelRef,
    component_count: usize,
    clock: Arc<dyn Clock>,
}

impl EnrollmentManager {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        locks: Arc<IdentityLocks>,
        capabilities: VoiceCapabilities,
        background: BackgroundModelRef,
        component_count: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            locks,
            capabilities,
            background,
            component_count,
            clock,
        }
    }

    /// Enroll (or re-enroll) `user` from one or more samples
    pub fn enroll(&self, user: &str, samples: &[RawAudio]) -> AuthResult<EnrollmentOutcome> {
        validate_identity(user)?;
        if samples.is_empty() {
            return Err(AuthError::NoSamples);
        }

        log::info!(
            "Starting enrollment for user '{}' with {} samples",
            user,
            samples.len()
        );

        let mut features = FeatureSet::default();
        for (index, sample) in samples.iter().enumerate() {
            let pcm = normalize_sample(sample)?;
            let sample_features = extract_features(self.capabilities.extractor.as_ref(), &pcm)?;
            log::debug!(
                "Enrollment sample {}/{} for '{}': {} frames",
                index + 1,
                samples.len(),
                user,
                sample_features.len()
            );
            features.extend(sample_features);
        }

        if features.is_empty() {
            log::warn!("No valid features extracted for '{}'", user);
            return Err(AuthError::NoValidFeatures);
        }

        let model = self
            .capabilities
            .trainer
            .train(&features, &self.background, self.component_count)
            .map_err(|e| AuthError::TrainingFailed(format!("{:#}", e)))?;

        let scores = model
            .score_each(&features)
            .map_err(|e| AuthError::capability(Capability::Model, e))?;
        let baseline = BaselineStatistics::from_scores(&scores, self.clock.now()).ok_or_else(
            || {
                AuthError::capability(
                    Capability::Model,
                    anyhow!("Self-scoring produced no finite log-likelihoods"),
                )
            },
        )?;

        let model_bytes = model
            .to_bytes()
            .map_err(|e| AuthError::capability(Capability::Model, e))?;

        let profile = StoredProfile::new(
            user,
            model_bytes,
            Some(baseline.clone()),
            self.clock.now(),
            samples.len(),
            features.len(),
        );

        {
            let lock = self.locks.lock_for(user);
            let _guard = lock.write().unwrap_or_else(|e| e.into_inner());
            self.store
                .replace(&profile)
                .map_err(|e| AuthError::capability(Capability::Persistence, e))?;
        }

        log::info!(
            "Enrollment complete for '{}': {} samples, {} frames, mean={:.2}, std={:.2}",
            user,
            samples.len(),
            features.len(),
            baseline.mean_score,
            baseline.std_score
        );

        Ok(EnrollmentOutcome {
            user: user.to_string(),
            profile_created: true,
            baseline,
            samples_processed: samples.len(),
            feature_frames: features.len(),
        })
    }

    /// Check if a profile exists for a user
    pub fn profile_exists(&self, user: &str) -> AuthResult<bool> {
        validate_identity(user)?;
        let lock = self.locks.lock_for(user);
        let _guard = lock.read().unwrap_or_else(|e| e.into_inner());
        self.store
            .exists(user)
            .map_err(|e| AuthError::capability(Capability::Persistence, e))
    }

    /// Summary of a user's profile
    pub fn profile_info(&self, user: &str) -> AuthResult<ProfileInfo> {
        validate_identity(user)?;
        let lock = self.locks.lock_for(user);
        let _guard = lock.read().unwrap_or_else(|e| e.into_inner());
        self.store
            .load(user)
            .map_err(|e| AuthError::capability(Capability::Persistence, e))?
            .map(|p| p.info())
            .ok_or_else(|| AuthError::UserNotEnrolled(user.to_string()))
    }

    /// Delete a user's profile
    pub fn delete_profile(&self, user: &str) -> AuthResult<()> {
        validate_identity(user)?;
        let lock = self.locks.lock_for(user);
        let _guard = lock.write().unwrap_or_else(|e| e.into_inner());
        let removed = self
            .store
            .remove(user)
            .map_err(|e| AuthError::capability(Capability::Persistence, e))?;
        if !removed {
            return Err(AuthError::UserNotEnrolled(user.to_string()));
        }
        log::info!("Deleted profile for user: {}", user);
        Ok(())
    }

    /// List all enrolled users
    pub fn list_profiles(&self) -> AuthResult<Vec<String>> {
        self.store
            .list()
            .map_err(|e| AuthError::capability(Capability::Persistence, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::ErrorKind;
    use crate::store::MemoryProfileStore;
    use crate::voice::testing::{tagged, ScriptedExtractor, ScriptedTrainer};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    struct Harness {
        store: Arc<MemoryProfileStore>,
        extractor: Arc<ScriptedExtractor>,
        trainer: Arc<ScriptedTrainer>,
        manager: EnrollmentManager,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryProfileStore::new());
        let extractor = Arc::new(ScriptedExtractor::default());
        let trainer = Arc::new(ScriptedTrainer::default());
        let manager = EnrollmentManager::new(
            store.clone(),
            Arc::new(IdentityLocks::new()),
            VoiceCapabilities {
                extractor: extractor.clone(),
                trainer: trainer.clone(),
                liveness: None,
            },
            BackgroundModelRef {
                path: PathBuf::from("ubm.model"),
            },
            32,
            Arc::new(SystemClock),
        );
        Harness {
            store,
            extractor,
            trainer,
            manager,
        }
    }

    #[test]
    fn test_enroll_computes_baseline_from_own_scores() {
        let h = harness();
        h.extractor.script(1, &[-18.0, -22.0]);

        let outcome = h.manager.enroll("alice", &[tagged(1)]).unwrap();

        assert!(outcome.profile_created);
        assert!((outcome.baseline.mean_score + 20.0).abs() < 1e-9);
        assert!((outcome.baseline.std_score - 2.0).abs() < 1e-9);
        assert_eq!(outcome.samples_processed, 1);
        assert_eq!(outcome.feature_frames, 2);
        assert_eq!(h.trainer.last_components.load(Ordering::SeqCst), 32);

        let stored = h.store.load("alice").unwrap().unwrap();
        assert_eq!(stored.baseline, Some(outcome.baseline));
    }

    #[test]
    fn test_enroll_concatenates_all_samples() {
        let h = harness();
        h.extractor.script(1, &[-10.0]);
        h.extractor.script(2, &[-20.0, -30.0]);

        let outcome = h.manager.enroll("alice", &[tagged(1), tagged(2)]).unwrap();
        assert_eq!(outcome.feature_frames, 3);
        assert!((outcome.baseline.mean_score + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_enroll_no_samples() {
        let h = harness();
        let err = h.manager.enroll("alice", &[]).unwrap_err();
        assert!(matches!(err, AuthError::NoSamples));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_enroll_no_valid_features() {
        let h = harness();
        let err = h.manager.enroll("alice", &[tagged(9), tagged(10)]).unwrap_err();
        assert!(matches!(err, AuthError::NoValidFeatures));
        assert_eq!(h.trainer.trained.load(Ordering::SeqCst), 0);
        assert!(!h.manager.profile_exists("alice").unwrap());
    }

    #[test]
    fn test_enroll_invalid_identity() {
        let h = harness();
        let err = h.manager.enroll("", &[tagged(1)]).unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdentity(_)));
    }

    #[test]
    fn test_training_failure_keeps_prior_profile() {
        let h = harness();
        h.extractor.script(1, &[-18.0, -22.0]);
        h.extractor.script(2, &[-50.0]);
        h.manager.enroll("alice", &[tagged(1)]).unwrap();
        let before = h.store.load("alice").unwrap().unwrap();

        h.trainer.fail.store(true, Ordering::SeqCst);
        let err = h.manager.enroll("alice", &[tagged(2)]).unwrap_err();
        assert!(matches!(err, AuthError::TrainingFailed(_)));

        assert_eq!(h.store.load("alice").unwrap().unwrap(), before);
    }

    #[test]
    fn test_extractor_failure_is_capability_error() {
        let h = harness();
        h.extractor.fail.store(true, Ordering::SeqCst);

        let err = h.manager.enroll("alice", &[tagged(1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert!(matches!(
            err,
            AuthError::Capability {
                capability: Capability::FeatureExtractor,
                ..
            }
        ));
    }

    #[test]
    fn test_reenrollment_discards_old_samples() {
        let h = harness();
        h.extractor.script(1, &[-18.0, -22.0]);
        h.extractor.script(3, &[-40.0]);

        h.manager.enroll("alice", &[tagged(1)]).unwrap();
        let outcome = h.manager.enroll("alice", &[tagged(3)]).unwrap();

        assert_eq!(outcome.baseline.mean_score, -40.0);
        assert_eq!(outcome.feature_frames, 1);
        let stored = h.store.load("alice").unwrap().unwrap();
        assert_eq!(stored.feature_frames, 1);
        assert_eq!(stored.baseline.unwrap().mean_score, -40.0);
    }

    #[test]
    fn test_profile_management() {
        let h = harness();
        h.extractor.script(1, &[-20.0]);
        h.manager.enroll("alice", &[tagged(1)]).unwrap();
        h.manager.enroll("bob", &[tagged(1)]).unwrap();

        assert_eq!(h.manager.list_profiles().unwrap(), vec!["alice", "bob"]);
        let info = h.manager.profile_info("alice").unwrap();
        assert!(info.has_baseline);
        assert_eq!(info.samples_processed, 1);

        h.manager.delete_profile("bob").unwrap();
        assert!(!h.manager.profile_exists("bob").unwrap());
        assert!(matches!(
            h.manager.delete_profile("bob"),
            Err(AuthError::UserNotEnrolled(_))
        ));
    }
}
