//! Keyed lock table: one lock per identity or subject
//!
//! Operations on the same key serialize through the key's lock; distinct keys
//! never contend beyond the brief table lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Idle entries are pruned once the table grows past this many keys
const PRUNE_AT: usize = 1024;

pub struct KeyedLocks<L> {
    table: Mutex<HashMap<String, Arc<L>>>,
}

/// Enrollment takes the write side, verification the read side
pub type IdentityLocks = KeyedLocks<RwLock<()>>;

/// Issue, verify and sweep of one subject are mutually exclusive
pub type SubjectLocks = KeyedLocks<Mutex<()>>;

impl<L: Default> Default for KeyedLocks<L> {
    fn default() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: Default> KeyedLocks<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock for `key`
    pub fn lock_for(&self, key: &str) -> Arc<L> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());

        if table.len() >= PRUNE_AT {
            // Only the table holds these: nobody is waiting on them
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(L::default()))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap().len()
    }
}
