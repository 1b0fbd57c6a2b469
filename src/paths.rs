use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (config.toml)
    pub config: PathBuf,
    /// Data directory (profiles, background model)
    pub data: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for Vocalis
    ///
    /// # Platform Paths
    ///
    /// ## Linux
    /// - Config: `~/.config/vocalis/`
    /// - Data: `~/.local/share/vocalis/` → profiles/, models/
    ///
    /// ## macOS
    /// - Config: `~/Library/Application Support/com.LotusEmberLabs.Vocalis/`
    /// - Data: `~/Library/Application Support/com.LotusEmberLabs.Vocalis/`
    ///
    /// ## Windows
    /// - Config: `%APPDATA%\LotusEmberLabs\Vocalis\config\`
    /// - Data: `%APPDATA%\LotusEmberLabs\Vocalis\data\`
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "LotusEmberLabs", "Vocalis")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
            data: proj_dirs.data_dir().to_path_buf(),
        })
    }

    /// Paths rooted at an explicit directory (overrides OS conventions)
    pub fn rooted_at(root: PathBuf) -> Self {
        Self {
            config: root.clone(),
            data: root,
        }
    }

    /// Create all necessary directories
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;
        fs::create_dir_all(&self.data).context("Failed to create data directory")?;
        fs::create_dir_all(self.profiles_dir())
            .context("Failed to create profiles directory")?;
        fs::create_dir_all(self.models_dir()).context("Failed to create models directory")?;

        log::info!("Application directories initialized");
        log::debug!("  Config: {}", self.config.display());
        log::debug!("  Data:   {}", self.data.display());

        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Get path to profiles directory
    pub fn profiles_dir(&self) -> PathBuf {
        self.data.join("profiles")
    }

    /// Get path to models directory
    pub fn models_dir(&self) -> PathBuf {
        self.data.join("models")
    }

    /// Get default path to the universal background model
    pub fn background_model_file(&self) -> PathBuf {
        self.models_dir().join("ubm.model")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_creation() {
        let paths = AppPaths::new().expect("Failed to create paths");

        assert!(!paths.config.as_os_str().is_empty());
        assert!(!paths.data.as_os_str().is_empty());
    }

    #[test]
    fn test_rooted_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted_at(dir.path().to_path_buf());
        paths.ensure_directories().unwrap();

        assert!(paths.profiles_dir().is_dir());
        assert!(paths.models_dir().is_dir());
        assert_eq!(paths.config_file(), dir.path().join("config.toml"));
        assert_eq!(
            paths.background_model_file(),
            dir.path().join("models").join("ubm.model")
        );
    }
}
