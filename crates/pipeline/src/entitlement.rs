//! Yes/no gate in front of billable generation work.
//!
//! The service asks [`EntitlementGate::can_proceed`] before a request is
//! queued, and the dispatcher calls [`EntitlementGate::consume`] right
//! before the provider job is created.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

/// Answer of [`EntitlementGate::can_proceed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub allowed: bool,
    pub reason: String,
}

impl Entitlement {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntitlementError {
    #[error("No generation credits left")]
    Exhausted,

    #[error("Entitlement check failed: {0}")]
    Backend(String),
}

#[async_trait]
pub trait EntitlementGate: Send + Sync {
    async fn can_proceed(&self) -> Entitlement;

    async fn consume(&self) -> Result<(), EntitlementError>;
}

/// Gate that always allows.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmetered;

#[async_trait]
impl EntitlementGate for Unmetered {
    async fn can_proceed(&self) -> Entitlement {
        Entitlement::allowed()
    }

    async fn consume(&self) -> Result<(), EntitlementError> {
        Ok(())
    }
}

/// Gate backed by a finite credit balance; one credit per job.
#[derive(Debug)]
pub struct CreditGate {
    remaining: AtomicU64,
}

impl CreditGate {
    pub fn new(credits: u64) -> Self {
        Self {
            remaining: AtomicU64::new(credits),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EntitlementGate for CreditGate {
    async fn can_proceed(&self) -> Entitlement {
        if self.remaining() > 0 {
            Entitlement::allowed()
        } else {
            Entitlement::denied("No generation credits left")
        }
    }

    async fn consume(&self) -> Result<(), EntitlementError> {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| EntitlementError::Exhausted)
    }
}
