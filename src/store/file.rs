//! Encrypted on-disk profile store
//!
//! One `<user>.profile` JSON file per identity. The model blob is encrypted with
//! XChaCha20-Poly1305 (user key bound as associated data); baseline and metadata
//! stay in clear. Replacement writes a temp file and renames it over the old one,
//! so model and baseline always change together.

use super::{ProfileStore, StoredProfile};
use crate::baseline::BaselineStatistics;
use anyhow::{anyhow, bail, Context, Result};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use chrono::{DateTime, Utc};
use rand_core::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const PROFILE_EXTENSION: &str = "profile";
const NONCE_LEN: usize = 24;

/// On-disk profile layout
#[derive(Serialize, Deserialize)]
struct ProfileFile {
    user: String,
    /// XChaCha20-Poly1305 nonce (192-bit)
    nonce: Vec<u8>,
    /// Encrypted model bytes
    ciphertext: Vec<u8>,
    model_sha256: String,
    #[serde(default, deserialize_with = "lenient_baseline")]
    baseline: Option<BaselineStatistics>,
    created_at: DateTime<Utc>,
    samples_processed: usize,
    feature_frames: usize,
}

pub struct FileProfileStore {
    profiles_dir: PathBuf,
    encryption_key: Zeroizing<[u8; 32]>,
}

impl FileProfileStore {
    /// Open (creating if needed) a profile directory and its encryption key
    pub fn open(profiles_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&profiles_dir).context("Failed to create profiles directory")?;
        let encryption_key = Self::get_or_create_encryption_key(&profiles_dir)?;

        log::info!("Profile store opened at {}", profiles_dir.display());
        Ok(Self {
            profiles_dir,
            encryption_key,
        })
    }

    /// Get or create encryption key for model storage
    fn get_or_create_encryption_key(profiles_dir: &Path) -> Result<Zeroizing<[u8; 32]>> {
        let key_path = profiles_dir.join(".key");

        let key = if key_path.exists() {
            let key_bytes =
                Zeroizing::new(fs::read(&key_path).context("Failed to read encryption key")?);
            if key_bytes.len() != 32 {
                bail!("Invalid encryption key length");
            }
            let mut key_array = Zeroizing::new([0u8; 32]);
            key_array.copy_from_slice(&key_bytes);
            key_array
        } else {
            let mut key_array = Zeroizing::new([0u8; 32]);
            OsRng.fill_bytes(&mut *key_array);

            fs::write(&key_path, &*key_array).context("Failed to write encryption key")?;
            restrict_permissions(&key_path).context("Failed to set key file permissions")?;

            log::info!("Generated new profile encryption key");
            key_array
        };

        Ok(key)
    }

    fn profile_path(&self, user: &str) -> PathBuf {
        self.profiles_dir
            .join(format!("{}.{}", user, PROFILE_EXTENSION))
    }

    fn temp_path(&self, user: &str) -> PathBuf {
        self.profiles_dir
            .join(format!(".{}.{}.tmp", user, PROFILE_EXTENSION))
    }

    fn encrypt_model(&self, user: &str, model: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let cipher = XChaCha20Poly1305::new((&*self.encryption_key).into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from(nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: model,
                    aad: user.as_bytes(),
                },
            )
            .map_err(|e| anyhow!("Encryption failed: {:?}", e))?;

        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    fn decrypt_model(&self, file: &ProfileFile) -> Result<Vec<u8>> {
        if file.nonce.len() != NONCE_LEN {
            bail!("Invalid nonce length: {}", file.nonce.len());
        }

        let cipher = XChaCha20Poly1305::new((&*self.encryption_key).into());
        let nonce = XNonce::from_slice(&file.nonce);

        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &file.ciphertext,
                    aad: file.user.as_bytes(),
                },
            )
            .map_err(|e| anyhow!("Decryption failed: {:?}", e))
    }
}

impl ProfileStore for FileProfileStore {
    fn load(&self, user: &str) -> Result<Option<StoredProfile>> {
        let path = self.profile_path(user);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        let file: ProfileFile =
            serde_json::from_str(&json).context("Failed to deserialize profile")?;

        if file.user != user {
            bail!(
                "Profile file {} belongs to '{}', not '{}'",
                path.display(),
                file.user,
                user
            );
        }

        let model = self.decrypt_model(&file)?;

        Ok(Some(StoredProfile {
            user: file.user,
            model,
            baseline: file.baseline,
            created_at: file.created_at,
            samples_processed: file.samples_processed,
            feature_frames: file.feature_frames,
            model_sha256: file.model_sha256,
        }))
    }

    fn replace(&self, profile: &StoredProfile) -> Result<()> {
        let (nonce, ciphertext) = self.encrypt_model(&profile.user, &profile.model)?;

        let file = ProfileFile {
            user: profile.user.clone(),
            nonce,
            ciphertext,
            model_sha256: profile.model_sha256.clone(),
            baseline: profile.baseline.clone(),
            created_at: profile.created_at,
            samples_processed: profile.samples_processed,
            feature_frames: profile.feature_frames,
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize profile")?;

        let temp_path = self.temp_path(&profile.user);
        {
            let mut out = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            out.write_all(json.as_bytes())
                .context("Failed to write profile")?;
            out.sync_all().context("Failed to flush profile")?;
        }
        restrict_permissions(&temp_path).context("Failed to set profile permissions")?;

        let path = self.profile_path(&profile.user);
        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e).with_context(|| format!("Failed to install {}", path.display()));
        }

        log::info!(
            "Profile for '{}' written to {} ({} samples)",
            profile.user,
            path.display(),
            profile.samples_processed
        );
        Ok(())
    }

    fn remove(&self, user: &str) -> Result<bool> {
        let path = self.profile_path(user);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path).context("Failed to delete profile")?;
        log::info!("Deleted profile for user: {}", user);
        Ok(true)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut users = Vec::new();

        for entry in
            fs::read_dir(&self.profiles_dir).context("Failed to read profiles directory")?
        {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some(PROFILE_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !stem.starts_with('.') {
                        users.push(stem.to_string());
                    }
                }
            }
        }

        users.sort();
        Ok(users)
    }
}

/// An unreadable baseline is dropped so verification uses the default threshold
fn lenient_baseline<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<BaselineStatistics>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match serde_json::from_value(v) {
        Ok(baseline) => Some(baseline),
        Err(e) => {
            log::warn!("Ignoring unreadable baseline statistics: {}", e);
            None
        }
    }))
}

/// Owner-only read/write on unix; no-op elsewhere
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user: &str, model: &[u8], mean: Option<f64>) -> StoredProfile {
        let baseline = mean.and_then(|m| BaselineStatistics::from_scores(&[m], Utc::now()));
        StoredProfile::new(user, model.to_vec(), baseline, Utc::now(), 2, 40)
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();

        let original = profile("alice", b"model-bytes", Some(-20.0));
        store.replace(&original).unwrap();

        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(loaded.verify_integrity().is_ok());
        assert_eq!(store.baseline("alice").unwrap().unwrap().mean_score, -20.0);
    }

    #[test]
    fn test_model_encrypted_at_rest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();
        store
            .replace(&profile("alice", b"SECRET-MODEL-PAYLOAD", None))
            .unwrap();

        let raw = fs::read_to_string(dir.path().join("alice.profile")).unwrap();
        let file: ProfileFile = serde_json::from_str(&raw).unwrap();
        assert!(!file
            .ciphertext
            .windows(6)
            .any(|w| w == b"SECRET"));
    }

    #[test]
    fn test_replace_overwrites_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();

        store.replace(&profile("alice", b"old", Some(-10.0))).unwrap();
        store.replace(&profile("alice", b"new", Some(-30.0))).unwrap();

        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded.model, b"new");
        assert_eq!(loaded.baseline.unwrap().mean_score, -30.0);
        assert_eq!(store.list().unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_key_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();
            store.replace(&profile("bob", b"m", None)).unwrap();
        }
        let reopened = FileProfileStore::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.load("bob").unwrap().unwrap().model, b"m");
    }

    #[test]
    fn test_swapped_file_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();
        store.replace(&profile("alice", b"alice-model", None)).unwrap();

        // Forge bob's profile from alice's ciphertext
        let raw = fs::read_to_string(dir.path().join("alice.profile")).unwrap();
        let mut file: ProfileFile = serde_json::from_str(&raw).unwrap();
        file.user = "bob".to_string();
        fs::write(
            dir.path().join("bob.profile"),
            serde_json::to_string(&file).unwrap(),
        )
        .unwrap();

        assert!(store.load("bob").is_err());
    }

    #[test]
    fn test_corrupted_baseline_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();
        store
            .replace(&profile("alice", b"alice-model", Some(-20.0)))
            .unwrap();

        let path = dir.path().join("alice.profile");
        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        json["baseline"] = serde_json::json!({ "mean_score": "garbage" });
        fs::write(&path, json.to_string()).unwrap();

        let loaded = store.load("alice").unwrap().unwrap();
        assert!(loaded.baseline.is_none());
        assert_eq!(loaded.model, b"alice-model");
        assert!(loaded.verify_integrity().is_ok());
        assert!(store.baseline("alice").unwrap().is_none());

        // A missing field reads the same as an absent baseline
        json.as_object_mut().unwrap().remove("baseline");
        fs::write(&path, json.to_string()).unwrap();
        assert!(store.load("alice").unwrap().unwrap().baseline.is_none());
    }

    #[test]
    fn test_remove_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::open(dir.path().to_path_buf()).unwrap();

        assert!(store.load("ghost").unwrap().is_none());
        assert!(!store.remove("ghost").unwrap());

        store.replace(&profile("alice", b"m", None)).unwrap();
        assert!(store.remove("alice").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
