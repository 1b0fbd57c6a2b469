use super::{ProfileStore, StoredProfile};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-process profile store (tests and embedding)
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, StoredProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, user: &str) -> Result<Option<StoredProfile>> {
        let profiles = self.profiles.read().unwrap_or_else(|e| e.into_inner());
        Ok(profiles.get(user).cloned())
    }

    fn replace(&self, profile: &StoredProfile) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        profiles.insert(profile.user.clone(), profile.clone());
        Ok(())
    }

    fn remove(&self, user: &str) -> Result<bool> {
        let mut profiles = self.profiles.write().unwrap_or_else(|e| e.into_inner());
        Ok(profiles.remove(user).is_some())
    }

    fn list(&self) -> Result<Vec<String>> {
        let profiles = self.profiles.read().unwrap_or_else(|e| e.into_inner());
        let mut users: Vec<String> = profiles.keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}
