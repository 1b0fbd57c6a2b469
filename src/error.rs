//! Typed errors for the authentication core
//!
//! Domain rejections (liveness failed, score below threshold, code mismatch or
//! expiry) are outcome values and never appear here.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// External capability that failed to produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FeatureExtractor,
    Model,
    Liveness,
    Persistence,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::FeatureExtractor => "feature extractor",
            Capability::Model => "voice model",
            Capability::Liveness => "liveness classifier",
            Capability::Persistence => "storage",
        };
        f.write_str(name)
    }
}

/// Coarse error category surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Capability,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("No audio samples provided")]
    NoSamples,

    #[error("No valid features extracted from audio samples")]
    NoValidFeatures,

    #[error("One-time code is required")]
    MissingCode,

    #[error("User '{0}' is not enrolled")]
    UserNotEnrolled(String),

    #[error("Model training failed: {0}")]
    TrainingFailed(String),

    #[error("{capability} failed: {message}")]
    Capability {
        capability: Capability,
        message: String,
    },
}

impl AuthError {
    /// Wrap a capability failure, keeping the full context chain as text
    pub fn capability(capability: Capability, err: anyhow::Error) -> Self {
        AuthError::Capability {
            capability,
            message: format!("{:#}", err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidIdentity(_)
            | AuthError::InvalidSubject(_)
            | AuthError::InvalidAudio(_)
            | AuthError::NoSamples
            | AuthError::NoValidFeatures
            | AuthError::MissingCode => ErrorKind::Validation,
            AuthError::UserNotEnrolled(_) => ErrorKind::NotFound,
            AuthError::TrainingFailed(_) | AuthError::Capability { .. } => ErrorKind::Capability,
        }
    }

    /// Short machine-readable tag, used in responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidIdentity(_) => "invalid_identity",
            AuthError::InvalidSubject(_) => "invalid_subject",
            AuthError::InvalidAudio(_) => "invalid_audio",
            AuthError::NoSamples => "no_samples",
            AuthError::NoValidFeatures => "no_valid_features",
            AuthError::MissingCode => "missing_code",
            AuthError::UserNotEnrolled(_) => "user_not_enrolled",
            AuthError::TrainingFailed(_) => "training_failed",
            AuthError::Capability { .. } => "capability_error",
        }
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
