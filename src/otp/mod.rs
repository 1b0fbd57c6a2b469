//! One-time codes: the secondary factor, keyed by contact address
//!
//! Per subject the lifecycle is `None -> Issued -> {Consumed, Expired}`. Issue,
//! verify and sweep of one subject run under that subject's lock, so an
//! in-flight verify always completes its expiry check and purge before a sweep
//! can look at the same entry.

pub mod store;
pub mod sweeper;

pub use store::{CodeStore, MemoryCodeStore};
pub use sweeper::OtpSweeper;

use crate::capabilities::CodeNotifier;
use crate::clock::Clock;
use crate::config::OtpConfig;
use crate::error::{AuthError, AuthResult, Capability};
use crate::locks::SubjectLocks;
use crate::validation::validate_subject;
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stored code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub subject: String,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl OneTimeCode {
    /// A code is still valid at the exact instant it expires
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of issuing a code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCode {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether the notifier accepted the code for delivery
    pub delivered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeRejection {
    /// No entry for the subject, or the entry was already used
    NoCodeIssued,
    Expired,
    Mismatch,
}

impl CodeRejection {
    pub fn message(&self) -> &'static str {
        match self {
            CodeRejection::NoCodeIssued => "No code issued for this subject",
            CodeRejection::Expired => "Code has expired",
            CodeRejection::Mismatch => "Invalid code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeVerification {
    pub success: bool,
    pub reason: Option<CodeRejection>,
}

impl CodeVerification {
    fn accepted() -> Self {
        Self {
            success: true,
            reason: None,
        }
    }

    fn rejected(reason: CodeRejection) -> Self {
        Self {
            success: false,
            reason: Some(reason),
        }
    }
}

/// Source of numeric codes
pub trait CodeGenerator: Send + Sync {
    fn generate(&self, length: usize) -> String;
}

/// Uniform decimal digits from the operating system RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngCodes;

impl OsRngCodes {
    /// Largest multiple of 10 that fits in a u32; draws at or above it are retried
    const ZONE: u32 = u32::MAX - (u32::MAX % 10);
}

impl CodeGenerator for OsRngCodes {
    fn generate(&self, length: usize) -> String {
        (0..length)
            .map(|_| loop {
                let draw = OsRng.next_u32();
                if draw < Self::ZONE {
                    break char::from(b'0' + (draw % 10) as u8);
                }
            })
            .collect()
    }
}

pub struct OneTimeCodeService {
    store: Arc<dyn CodeStore>,
    locks: SubjectLocks,
    generator: Arc<dyn CodeGenerator>,
    notifier: Arc<dyn CodeNotifier>,
    clock: Arc<dyn Clock>,
    code_length: usize,
    ttl: Duration,
}

impl OneTimeCodeService {
    pub fn new(
        store: Arc<dyn CodeStore>,
        generator: Arc<dyn CodeGenerator>,
        notifier: Arc<dyn CodeNotifier>,
        clock: Arc<dyn Clock>,
        config: &OtpConfig,
    ) -> Self {
        Self {
            store,
            locks: SubjectLocks::new(),
            generator,
            notifier,
            clock,
            code_length: config.code_length,
            ttl: config.ttl(),
        }
    }

    /// Issue a fresh code for `subject`, invalidating any previous one
    pub fn issue(&self, subject: &str) -> AuthResult<IssuedCode> {
        validate_subject(subject)?;

        let code = self.generator.generate(self.code_length);
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;

        {
            let lock = self.locks.lock_for(subject);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.store
                .put(OneTimeCode {
                    subject: subject.to_string(),
                    code: code.clone(),
                    issued_at,
                    expires_at,
                    consumed: false,
                })
                .map_err(|e| AuthError::capability(Capability::Persistence, e))?;
        }

        log::info!(
            "Issued one-time code for {} (expires {})",
            subject,
            expires_at.to_rfc3339()
        );

        let delivered = match self.notifier.deliver(subject, &code, expires_at) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to deliver one-time code to {}: {:#}", subject, e);
                false
            }
        };

        Ok(IssuedCode {
            code,
            issued_at,
            expires_at,
            delivered,
        })
    }

    /// Check `candidate` against the live code for `subject`
    ///
    /// A mismatch keeps the code so the subject can retry until it expires.
    /// There is no attempt limit.
    pub fn verify(&self, subject: &str, candidate: &str) -> AuthResult<CodeVerification> {
        validate_subject(subject)?;
        if candidate.is_empty() {
            return Err(AuthError::MissingCode);
        }

        let lock = self.locks.lock_for(subject);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let entry = self
            .store
            .get(subject)
            .map_err(|e| AuthError::capability(Capability::Persistence, e))?;

        let entry = match entry {
            Some(entry) if !entry.consumed => entry,
            _ => {
                log::debug!("No live code for {}", subject);
                return Ok(CodeVerification::rejected(CodeRejection::NoCodeIssued));
            }
        };

        if entry.is_expired(self.clock.now()) {
            self.purge(subject)?;
            log::info!("One-time code for {} expired", subject);
            return Ok(CodeVerification::rejected(CodeRejection::Expired));
        }

        if !codes_match(&entry.code, candidate) {
            log::info!("One-time code mismatch for {}", subject);
            return Ok(CodeVerification::rejected(CodeRejection::Mismatch));
        }

        self.purge(subject)?;
        log::info!("One-time code verified for {}", subject);
        Ok(CodeVerification::accepted())
    }

    /// Remove every expired or consumed entry, returning how many were removed
    pub fn sweep(&self) -> AuthResult<usize> {
        let subjects = self
            .store
            .subjects()
            .map_err(|e| AuthError::capability(Capability::Persistence, e))?;

        let mut removed = 0;
        for subject in subjects {
            let lock = self.locks.lock_for(&subject);
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

            // Re-read under the lock: a verify or issue may have run since listing
            let stale = self
                .store
                .get(&subject)
                .map_err(|e| AuthError::capability(Capability::Persistence, e))?
                .map_or(false, |entry| {
                    entry.consumed || entry.is_expired(self.clock.now())
                });

            if stale {
                self.purge(&subject)?;
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!("Swept {} stale one-time codes", removed);
        }
        Ok(removed)
    }

    fn purge(&self, subject: &str) -> AuthResult<()> {
        self.store
            .remove(subject)
            .map(|_| ())
            .map_err(|e| AuthError::capability(Capability::Persistence, e))
    }
}

/// Length-checked comparison that does not stop at the first differing byte
fn codes_match(expected: &str, candidate: &str) -> bool {
    let (a, b) = (expected.as_bytes(), candidate.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
