//! Per-identity profile storage
//!
//! A stored profile carries the serialized voice model together with its
//! baseline statistics. Backends only ever write the pair through
//! [`ProfileStore::replace`], which must be atomic: a reader sees the old
//! profile or the new one, never a mix.

use crate::baseline::BaselineStatistics;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod file;
pub mod memory;

pub use file::FileProfileStore;
pub use memory::MemoryProfileStore;

/// Everything persisted for one enrolled identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProfile {
    pub user: String,
    /// Serialized model, as produced by `VoiceModel::to_bytes`
    pub model: Vec<u8>,
    /// Absent only for legacy or damaged profiles
    pub baseline: Option<BaselineStatistics>,
    pub created_at: DateTime<Utc>,
    pub samples_processed: usize,
    pub feature_frames: usize,
    pub model_sha256: String,
}

impl StoredProfile {
    pub fn new(
        user: &str,
        model: Vec<u8>,
        baseline: Option<BaselineStatistics>,
        created_at: DateTime<Utc>,
        samples_processed: usize,
        feature_frames: usize,
    ) -> Self {
        let model_sha256 = sha256_hex(&model);
        Self {
            user: user.to_string(),
            model,
            baseline,
            created_at,
            samples_processed,
            feature_frames,
            model_sha256,
        }
    }

    /// Check the model blob against the digest recorded at enrollment
    pub fn verify_integrity(&self) -> Result<()> {
        let actual = sha256_hex(&self.model);
        if actual != self.model_sha256 {
            bail!(
                "Model digest mismatch for '{}': expected {}, got {}",
                self.user,
                self.model_sha256,
                actual
            );
        }
        Ok(())
    }

    pub fn info(&self) -> ProfileInfo {
        ProfileInfo {
            user: self.user.clone(),
            created_at: self.created_at,
            samples_processed: self.samples_processed,
            has_baseline: self.baseline.is_some(),
        }
    }
}

/// Profile summary safe to show to callers (no model internals)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub samples_processed: usize,
    pub has_baseline: bool,
}

/// Keyed persistence of voice profiles
pub trait ProfileStore: Send + Sync {
    fn load(&self, user: &str) -> Result<Option<StoredProfile>>;

    /// Atomically replace every artifact stored for `profile.user`
    fn replace(&self, profile: &StoredProfile) -> Result<()>;

    /// Remove a profile; `Ok(false)` if none existed
    fn remove(&self, user: &str) -> Result<bool>;

    fn list(&self) -> Result<Vec<String>>;

    fn exists(&self, user: &str) -> Result<bool> {
        Ok(self.load(user)?.is_some())
    }

    /// Baseline statistics for `user`, if enrolled and calibrated
    fn baseline(&self, user: &str) -> Result<Option<BaselineStatistics>> {
        Ok(self.load(user)?.and_then(|p| p.baseline))
    }
}

/// Compute SHA256 of a byte slice as lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
