//! Time sources.
//!
//! Cache expiry and session lifetimes are wall-clock decisions. They read the
//! time through [`Clock`] so tests can move time explicitly instead of
//! sleeping.

use crate::Timestamp;
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Abstraction over wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock instant.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<Timestamp>>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.write().unwrap_or_else(|p| p.into_inner());
        *now += delta;
    }

    /// Move the clock backwards.
    pub fn rewind(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        let mut now = self.now.write().unwrap_or_else(|p| p.into_inner());
        *now -= delta;
    }

    pub fn set(&self, to: Timestamp) {
        let mut now = self.now.write().unwrap_or_else(|p| p.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(|p| p.into_inner())
    }
}
