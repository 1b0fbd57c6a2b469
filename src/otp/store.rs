//! One-time code persistence

use super::OneTimeCode;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// Keyed storage of one-time codes, at most one entry per subject
pub trait CodeStore: Send + Sync {
    fn get(&self, subject: &str) -> Result<Option<OneTimeCode>>;

    /// Store `code`, replacing any entry for the same subject
    fn put(&self, code: OneTimeCode) -> Result<()>;

    fn remove(&self, subject: &str) -> Result<Option<OneTimeCode>>;

    fn subjects(&self) -> Result<Vec<String>>;
}

/// Process-local code store
#[derive(Default)]
pub struct MemoryCodeStore {
    codes: RwLock<HashMap<String, OneTimeCode>>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.codes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CodeStore for MemoryCodeStore {
    fn get(&self, subject: &str) -> Result<Option<OneTimeCode>> {
        let codes = self.codes.read().unwrap_or_else(|e| e.into_inner());
        Ok(codes.get(subject).cloned())
    }

    fn put(&self, code: OneTimeCode) -> Result<()> {
        let mut codes = self.codes.write().unwrap_or_else(|e| e.into_inner());
        codes.insert(code.subject.clone(), code);
        Ok(())
    }

    fn remove(&self, subject: &str) -> Result<Option<OneTimeCode>> {
        let mut codes = self.codes.write().unwrap_or_else(|e| e.into_inner());
        Ok(codes.remove(subject))
    }

    fn subjects(&self) -> Result<Vec<String>> {
        let codes = self.codes.read().unwrap_or_else(|e| e.into_inner());
        Ok(codes.keys().cloned().collect())
    }
}
