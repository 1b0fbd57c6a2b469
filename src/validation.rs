//! Input validation for identities, subjects, codes and tuning values
//!
//! User keys name storage entries, so they are restricted to a filename-safe
//! alphabet before they reach any store.

use crate::error::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Value too long: max {max}, got {actual}")]
    ValueTooLong { max: usize, actual: usize },
}

const MAX_IDENTITY_LEN: usize = 64;
const MAX_SUBJECT_LEN: usize = 254;

/// Validate a user key (alphanumeric + underscore/hyphen, max 64 chars)
pub fn validate_identity(user: &str) -> Result<&str, AuthError> {
    check_identity(user).map_err(|e| AuthError::InvalidIdentity(e.to_string()))?;
    Ok(user)
}

fn check_identity(user: &str) -> Result<(), ValidationError> {
    if user.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Username cannot be empty".to_string(),
        ));
    }

    if user.len() > MAX_IDENTITY_LEN {
        return Err(ValidationError::ValueTooLong {
            max: MAX_IDENTITY_LEN,
            actual: user.len(),
        });
    }

    if !user
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidFormat(
            "Username can only contain letters, numbers, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validate a contact address used as a one-time-code subject
///
/// Only shape is checked: non-empty, bounded, no whitespace or control characters.
pub fn validate_subject(subject: &str) -> Result<&str, AuthError> {
    check_subject(subject).map_err(|e| AuthError::InvalidSubject(e.to_string()))?;
    Ok(subject)
}

fn check_subject(subject: &str) -> Result<(), ValidationError> {
    if subject.is_empty() {
        return Err(ValidationError::InvalidFormat(
            "Contact address cannot be empty".to_string(),
        ));
    }

    if subject.len() > MAX_SUBJECT_LEN {
        return Err(ValidationError::ValueTooLong {
            max: MAX_SUBJECT_LEN,
            actual: subject.len(),
        });
    }

    if subject
        .chars()
        .any(|c| c.is_control() || c.is_whitespace())
    {
        return Err(ValidationError::InvalidFormat(
            "Contact address contains whitespace or control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate the threshold margin (finite, non-negative)
pub fn validate_margin(margin: f64) -> Result<f64, ValidationError> {
    if !margin.is_finite() || margin < 0.0 {
        return Err(ValidationError::InvalidRange(format!(
            "Threshold margin must be a finite value >= 0.0, got {}",
            margin
        )));
    }
    Ok(margin)
}

/// Validate a mixture component count (1 to 1024)
pub fn validate_component_count(count: usize) -> Result<usize, ValidationError> {
    if !(1..=1024).contains(&count) {
        return Err(ValidationError::InvalidRange(format!(
            "Component count must be between 1 and 1024, got {}",
            count
        )));
    }
    Ok(count)
}

/// Validate the liveness cutoff frequency in Hz (50Hz to Nyquist of 44.1kHz)
pub fn validate_cutoff_hz(cutoff: u32) -> Result<u32, ValidationError> {
    if !(50..=22050).contains(&cutoff) {
        return Err(ValidationError::InvalidRange(format!(
            "Cutoff frequency must be between 50Hz and 22050Hz, got {}Hz",
            cutoff
        )));
    }
    Ok(cutoff)
}

/// Validate one-time code length (4 to 10 digits)
pub fn validate_code_length(len: usize) -> Result<usize, ValidationError> {
    if !(4..=10).contains(&len) {
        return Err(ValidationError::InvalidRange(format!(
            "Code length must be between 4 and 10 digits, got {}",
            len
        )));
    }
    Ok(len)
}

/// Validate code time-to-live in seconds (10s to 1h)
pub fn validate_ttl_secs(ttl: u64) -> Result<u64, ValidationError> {
    if !(10..=3600).contains(&ttl) {
        return Err(ValidationError::InvalidRange(format!(
            "Code TTL must be between 10s and 3600s, got {}s",
            ttl
        )));
    }
    Ok(ttl)
}
