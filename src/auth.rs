//! Public operation surface: enroll, verify, issue code, verify code
//!
//! Responses are plain serde structs so any transport (the CLI here) can emit
//! them directly. Domain rejections come back inside the responses; only
//! validation, not-found and capability failures are errors.

use crate::audio::RawAudio;
use crate::baseline::BaselineStatistics;
use crate::capabilities::stub::{
    EnergyFeatureExtractor, GaussianTrainer, LogNotifier, NoVerdictLiveness,
};
use crate::capabilities::BackgroundModelRef;
use crate::clock::{Clock, SystemClock};
use crate::config::AuthConfig;
use crate::error::AuthResult;
use crate::locks::IdentityLocks;
use crate::otp::{
    CodeRejection, MemoryCodeStore, OneTimeCodeService, OsRngCodes, OtpSweeper,
};
use crate::paths::AppPaths;
use crate::store::{FileProfileStore, ProfileInfo, ProfileStore};
use crate::voice::{
    EnrollmentManager, RejectReason, VerificationOutcome, VerificationPipeline,
    VoiceCapabilities,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A user key together with the contact address codes are sent to
///
/// The contact is supplied by the caller; nothing here resolves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub contact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub profile_created: bool,
    pub baseline: BaselineStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub accepted: bool,
    pub score: Option<f64>,
    pub threshold: f64,
    pub reason: Option<RejectReason>,
}

impl From<VerificationOutcome> for VerifyResponse {
    fn from(outcome: VerificationOutcome) -> Self {
        Self {
            accepted: outcome.accepted,
            score: outcome.score,
            threshold: outcome.threshold,
            reason: outcome.reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueCodeResponse {
    pub issued: bool,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyCodeResponse {
    pub success: bool,
    pub reason: Option<CodeRejection>,
}

/// First login step: voice check, then a code if the voice matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub voice: VerifyResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<IssueCodeResponse>,
}

pub struct Authenticator {
    enrollment: EnrollmentManager,
    verification: VerificationPipeline,
    codes: Arc<OneTimeCodeService>,
    /// Stops the background sweep when dropped
    #[allow(dead_code)]
    sweeper: Option<OtpSweeper>,
}

impl Authenticator {
    pub fn new(
        enrollment: EnrollmentManager,
        verification: VerificationPipeline,
        codes: Arc<OneTimeCodeService>,
    ) -> Self {
        Self {
            enrollment,
            verification,
            codes,
            sweeper: None,
        }
    }

    /// Wire the file-backed store and the development capabilities
    pub fn open(paths: &AppPaths, config: &AuthConfig) -> Result<Self> {
        let profiles_dir = config
            .storage
            .profiles_dir
            .clone()
            .unwrap_or_else(|| paths.profiles_dir());
        let store: Arc<dyn ProfileStore> = Arc::new(FileProfileStore::open(profiles_dir)?);
        let background = BackgroundModelRef {
            path: config
                .enrollment
                .background_model
                .clone()
                .unwrap_or_else(|| paths.background_model_file()),
        };

        log::info!("Using development capabilities (energy features, Gaussian model)");
        let capabilities = VoiceCapabilities {
            extractor: Arc::new(EnergyFeatureExtractor::default()),
            trainer: Arc::new(GaussianTrainer::default()),
            liveness: Some(Arc::new(NoVerdictLiveness)),
        };
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let locks = Arc::new(IdentityLocks::new());

        let enrollment = EnrollmentManager::new(
            store.clone(),
            locks.clone(),
            capabilities.clone(),
            background,
            config.enrollment.component_count,
            clock.clone(),
        );
        let verification = VerificationPipeline::new(
            store,
            locks,
            capabilities,
            config.verification.threshold_policy(),
            config.verification.liveness_cutoff_hz,
            config.verification.require_liveness,
        );
        let codes = Arc::new(OneTimeCodeService::new(
            Arc::new(MemoryCodeStore::new()),
            Arc::new(OsRngCodes),
            Arc::new(LogNotifier),
            clock,
            &config.otp,
        ));

        let sweeper = config
            .otp
            .sweep_interval()
            .map(|interval| OtpSweeper::start(codes.clone(), interval))
            .transpose()?;

        Ok(Self {
            enrollment,
            verification,
            codes,
            sweeper,
        })
    }

    pub fn enroll(&self, user: &str, samples: &[RawAudio]) -> AuthResult<EnrollResponse> {
        let outcome = self.enrollment.enroll(user, samples)?;
        Ok(EnrollResponse {
            profile_created: outcome.profile_created,
            baseline: outcome.baseline,
        })
    }

    pub fn verify(&self, user: &str, sample: &RawAudio) -> AuthResult<VerifyResponse> {
        self.verification.verify(user, sample).map(Into::into)
    }

    pub fn issue_code(&self, subject: &str) -> AuthResult<IssueCodeResponse> {
        let issued = self.codes.issue(subject)?;
        Ok(IssueCodeResponse {
            issued: true,
            expires_at: issued.expires_at,
            delivered: issued.delivered,
        })
    }

    pub fn verify_code(&self, subject: &str, code: &str) -> AuthResult<VerifyCodeResponse> {
        let result = self.codes.verify(subject, code)?;
        Ok(VerifyCodeResponse {
            success: result.success,
            reason: result.reason,
        })
    }

    /// Verify the voice and, only on acceptance, send a code to the contact
    pub fn begin_login(&self, identity: &Identity, sample: &RawAudio) -> AuthResult<LoginResponse> {
        let voice = self.verify(&identity.user, sample)?;
        if !voice.accepted {
            log::info!("Login for '{}' stopped at voice check", identity.user);
            return Ok(LoginResponse { voice, code: None });
        }

        let code = self.issue_code(&identity.contact)?;
        Ok(LoginResponse {
            voice,
            code: Some(code),
        })
    }

    /// Second login step
    pub fn complete_login(&self, identity: &Identity, code: &str) -> AuthResult<VerifyCodeResponse> {
        self.verify_code(&identity.contact, code)
    }

    pub fn list_profiles(&self) -> AuthResult<Vec<String>> {
        self.enrollment.list_profiles()
    }

    pub fn profile_info(&self, user: &str) -> AuthResult<ProfileInfo> {
        self.enrollment.profile_info(user)
    }

    pub fn delete_profile(&self, user: &str) -> AuthResult<()> {
        self.enrollment.delete_profile(user)
    }

    /// Remove expired codes now, independent of the background sweeper
    pub fn sweep_codes(&self) -> AuthResult<usize> {
        self.codes.sweep()
    }
}
