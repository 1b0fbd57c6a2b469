//! Authentication configuration (TOML)

use crate::baseline::ThresholdPolicy;
use crate::validation::{
    validate_code_length, validate_component_count, validate_cutoff_hz, validate_margin,
    validate_ttl_secs, ValidationError,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentConfig {
    /// Mixture component count handed to the model trainer
    pub component_count: usize,
    /// Background model location; defaults to `<data>/models/ubm.model`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_model: Option<PathBuf>,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            component_count: 32,
            background_model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Subtracted from the baseline mean to get the acceptance threshold
    pub margin: f64,
    /// Threshold used when a profile has no baseline
    pub default_threshold: f64,
    /// Spectral cutoff handed to the liveness classifier (Hz)
    pub liveness_cutoff_hz: u32,
    /// Fail verification when the liveness classifier cannot decide
    #[serde(default)]
    pub require_liveness: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        let policy = ThresholdPolicy::default();
        Self {
            margin: policy.margin,
            default_threshold: policy.default_threshold,
            liveness_cutoff_hz: 4000,
            require_liveness: false,
        }
    }
}

impl VerificationConfig {
    pub fn threshold_policy(&self) -> ThresholdPolicy {
        ThresholdPolicy {
            margin: self.margin,
            default_threshold: self.default_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpConfig {
    pub code_length: usize,
    pub ttl_secs: u64,
    /// Background sweep interval; 0 disables the sweeper
    pub sweep_interval_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl OtpConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs as i64)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Profile directory; defaults to `<data>/profiles`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles_dir: Option<PathBuf>,
}

impl AuthConfig {
    /// Load config from file or create default
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: AuthConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            log::info!("Config loaded from: {}", path.display());
            config
        } else {
            let config = Self::default();
            let toml_str = toml::to_string_pretty(&config)?;
            fs::write(path, toml_str)
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
            log::info!("Default config created at: {}", path.display());
            config
        };

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_component_count(self.enrollment.component_count)?;
        validate_margin(self.verification.margin)?;
        if !self.verification.default_threshold.is_finite() {
            return Err(ValidationError::InvalidRange(format!(
                "Default threshold must be finite, got {}",
                self.verification.default_threshold
            )));
        }
        validate_cutoff_hz(self.verification.liveness_cutoff_hz)?;
        validate_code_length(self.otp.code_length)?;
        validate_ttl_secs(self.otp.ttl_secs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.enrollment.component_count, 32);
        assert_eq!(config.verification.margin, 5.0);
        assert_eq!(config.verification.default_threshold, -35.0);
        assert_eq!(config.verification.liveness_cutoff_hz, 4000);
        assert!(!config.verification.require_liveness);
        assert_eq!(config.otp.ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.otp.code_length, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = AuthConfig::load_or_create(&path).unwrap();
        assert!(path.exists());

        let reloaded = AuthConfig::load_or_create(&path).unwrap();
        assert_eq!(created, reloaded);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[verification]\nmargin = 3.0\ndefault_threshold = -40.0\nliveness_cutoff_hz = 4000\nrequire_liveness = true\n",
        )
        .unwrap();

        let config = AuthConfig::load_or_create(&path).unwrap();
        assert_eq!(config.verification.margin, 3.0);
        assert!(config.verification.require_liveness);
        assert_eq!(config.otp, OtpConfig::default());
        assert_eq!(config.storage.profiles_dir, None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[otp]\ncode_length = 2\nttl_secs = 300\nsweep_interval_secs = 60\n",
        )
        .unwrap();

        assert!(AuthConfig::load_or_create(&path).is_err());
    }

    #[test]
    fn test_sweep_interval_disabled_at_zero() {
        let otp = OtpConfig {
            sweep_interval_secs: 0,
            ..OtpConfig::default()
        };
        assert!(otp.sweep_interval().is_none());
    }
}
