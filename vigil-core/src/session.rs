//! Administrator session entity.
//!
//! # State Transition Diagram
//!
//! ```text
//! (absent) ─── create() ──→ Valid ─── expiry passes ──→ Expired ──→ (absent)
//!                             │  └── copies diverge ──→ Tampered ──→ (absent)
//!                        extend() ↺
//! ```

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An authenticated administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub username: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub last_extended_at: Timestamp,
}

impl Session {
    /// Issue a new session lasting `lifetime` from `now`.
    pub fn issue(username: impl Into<String>, now: Timestamp, lifetime: Duration) -> Self {
        Self {
            username: username.into(),
            issued_at: now,
            expires_at: now + to_chrono(lifetime),
            last_extended_at: now,
        }
    }

    /// Check if the session has expired based on current time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime, zero once expired.
    pub fn remaining(&self, now: Timestamp) -> Duration {
        if self.is_expired(now) {
            Duration::ZERO
        } else {
            (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
        }
    }

    /// Time since the expiry was last pushed forward.
    pub fn since_extension(&self, now: Timestamp) -> Duration {
        (now - self.last_extended_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Push the expiry to `now + lifetime`. Never shortens a session.
    pub fn extend(&mut self, now: Timestamp, lifetime: Duration) {
        let candidate = now + to_chrono(lifetime);
        if candidate > self.expires_at {
            self.expires_at = candidate;
        }
        self.last_extended_at = now;
    }

    /// Two copies describe the same login when username and issue time agree.
    pub fn same_identity(&self, other: &Session) -> bool {
        self.username == other.username && self.issued_at == other.issued_at
    }
}

/// Verdict of a dual-scope session check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session in at least one scope
    Absent,
    /// Both copies present, matching and unexpired
    Valid(Session),
    /// Both copies matched but the expiry has passed
    Expired { username: String },
    /// The copies diverged
    Tampered,
}

impl SessionStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SessionStatus::Valid(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionStatus::Valid(session) => Some(session),
            _ => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            SessionStatus::Valid(session) => Some(session),
            _ => None,
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    const FOUR_HOURS: Duration = Duration::from_secs(4 * 3600);

    #[test]
    fn test_issue_sets_expiry() {
        let now = Utc::now();
        let session = Session::issue("admin", now, FOUR_HOURS);
        assert_eq!(session.expires_at - now, chrono::Duration::hours(4));
        assert_eq!(session.last_extended_at, now);
        assert_eq!(session.remaining(now), FOUR_HOURS);
    }

    #[test]
    fn test_expired_at_exact_expiry() {
        let now = Utc::now();
        let session = Session::issue("admin", now, FOUR_HOURS);
        let at_expiry = session.expires_at;
        assert!(session.is_expired(at_expiry));
        assert_eq!(session.remaining(at_expiry), Duration::ZERO);
        assert!(!session.is_expired(at_expiry - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_extend_never_shortens() {
        let now = Utc::now();
        let mut session = Session::issue("admin", now, FOUR_HOURS);
        let original = session.expires_at;
        session.extend(now, Duration::from_secs(60));
        assert_eq!(session.expires_at, original);
        assert_eq!(session.last_extended_at, now);
    }

    #[test]
    fn test_same_identity_ignores_expiry() {
        let now = Utc::now();
        let a = Session::issue("admin", now, FOUR_HOURS);
        let mut b = a.clone();
        b.extend(now + chrono::Duration::hours(1), FOUR_HOURS);
        assert!(a.same_identity(&b));

        let mut c = a.clone();
        c.username = "intruder".into();
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_status_accessors() {
        let session = Session::issue("admin", Utc::now(), FOUR_HOURS);
        let status = SessionStatus::Valid(session.clone());
        assert!(status.is_valid());
        assert_eq!(status.session(), Some(&session));
        assert_eq!(SessionStatus::Tampered.session(), None);
        let expired = SessionStatus::Expired {
            username: "admin".into(),
        };
        assert_eq!(expired.into_session(), None);
    }

    proptest! {
        /// Extending at any point before expiry leaves at least `lifetime`
        /// of remaining time.
        #[test]
        fn prop_extension_restores_full_lifetime(elapsed_secs in 0u64..(4 * 3600)) {
            let start = Utc::now();
            let mut session = Session::issue("admin", start, FOUR_HOURS);
            let now = start + chrono::Duration::seconds(elapsed_secs as i64);
            session.extend(now, FOUR_HOURS);
            prop_assert_eq!(session.remaining(now), FOUR_HOURS);
        }
    }
}
