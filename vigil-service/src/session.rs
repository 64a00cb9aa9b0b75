//! Dual-scope administrator session guard.
//!
//! A session is written identically to two independent [`LocalScope`]s: a
//! persistent one and an ephemeral one. It is trusted only while both copies
//! exist and agree on who logged in and when. Any divergence is treated as
//! tampering and both copies are destroyed.
//!
//! ```text
//!   persistent   ephemeral    verdict
//!   ----------   ---------    -------
//!   missing      any          Absent   (orphan cleared)
//!   any          missing      Absent   (orphan cleared)
//!   unparsable   any          Tampered (both cleared)
//!   A            B, A != B    Tampered (both cleared)
//!   A            A, expired   Expired  (both cleared)
//!   A            A            Valid    (expiry pushed forward when due)
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};
use vigil_core::{
    CacheError, Clock, Session, SessionConfig, SessionError, SessionStatus, Timestamp,
};
use vigil_storage::LocalScope;

use crate::moderation::ModerationAction;

/// Proof that a valid session authorized one moderation action.
///
/// Only [`SessionGuard::require_for_action`] creates grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionGrant {
    username: String,
    action: ModerationAction,
    granted_at: Timestamp,
    session_expires_at: Timestamp,
}

impl ActionGrant {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn action(&self) -> ModerationAction {
        self.action
    }

    pub fn granted_at(&self) -> Timestamp {
        self.granted_at
    }

    pub fn session_expires_at(&self) -> Timestamp {
        self.session_expires_at
    }
}

/// One scope's copy of the session.
enum Slot {
    Missing,
    Unparsable,
    Present(Session),
}

/// Creates, validates, extends and destroys the administrator session.
#[derive(Clone)]
pub struct SessionGuard {
    persistent: Arc<dyn LocalScope>,
    ephemeral: Arc<dyn LocalScope>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("storage_key", &self.config.storage_key)
            .field("duration", &self.config.duration)
            .finish()
    }
}

impl SessionGuard {
    pub fn new(
        persistent: Arc<dyn LocalScope>,
        ephemeral: Arc<dyn LocalScope>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistent,
            ephemeral,
            config,
            clock,
        }
    }

    /// Start a session for `username` in both scopes.
    ///
    /// If either write fails, neither copy is left behind.
    pub fn create_session(&self, username: &str) -> Result<Session, CacheError> {
        let session = Session::issue(username, self.clock.now(), self.config.duration);
        if let Err(err) = self.store(&session) {
            self.clear();
            return Err(err);
        }
        info!(
            username = %session.username,
            expires_at = %session.expires_at,
            "Administrator session created"
        );
        Ok(session)
    }

    /// Check both copies and decide what the session is worth.
    pub fn validate(&self) -> SessionStatus {
        let now = self.clock.now();
        let persistent = self.load(&*self.persistent, "persistent");
        let ephemeral = self.load(&*self.ephemeral, "ephemeral");

        let (a, b) = match (persistent, ephemeral) {
            (Slot::Missing, Slot::Missing) => return SessionStatus::Absent,
            (Slot::Missing, _) | (_, Slot::Missing) => {
                debug!("Clearing orphaned session copy");
                self.clear();
                return SessionStatus::Absent;
            }
            (Slot::Unparsable, _) | (_, Slot::Unparsable) => {
                warn!("Unreadable session copy; session invalidated");
                self.clear();
                return SessionStatus::Tampered;
            }
            (Slot::Present(a), Slot::Present(b)) => (a, b),
        };

        if !a.same_identity(&b) {
            warn!(
                persistent_user = %a.username,
                ephemeral_user = %b.username,
                "Session copies diverged; session invalidated"
            );
            self.clear();
            return SessionStatus::Tampered;
        }

        // Copies may legitimately disagree on expiry after a partial
        // extension. Trust the earlier one.
        let mut session = if a.expires_at <= b.expires_at { a } else { b };

        if session.is_expired(now) {
            info!(username = %session.username, "Administrator session expired");
            self.clear();
            return SessionStatus::Expired {
                username: session.username,
            };
        }

        if session.remaining(now) < self.config.low_water_mark
            || session.since_extension(now) >= self.config.refresh_interval
        {
            self.extend(&mut session, now);
        }

        SessionStatus::Valid(session)
    }

    /// Authorize `action`, or say why not.
    ///
    /// A merely old session never blocks an action: if the remaining time is
    /// below the low-water mark the session is extended before the grant.
    pub fn require_for_action(&self, action: ModerationAction) -> Result<ActionGrant, SessionError> {
        let mut session = match self.validate() {
            SessionStatus::Valid(session) => session,
            SessionStatus::Absent => return Err(SessionError::Absent),
            SessionStatus::Expired { username } => return Err(SessionError::Expired { username }),
            SessionStatus::Tampered => return Err(SessionError::Tampered),
        };

        let now = self.clock.now();
        if session.remaining(now) < self.config.low_water_mark {
            self.extend(&mut session, now);
        }

        debug!(username = %session.username, action = action.as_str(), "Action granted");
        Ok(ActionGrant {
            username: session.username,
            action,
            granted_at: now,
            session_expires_at: session.expires_at,
        })
    }

    /// Destroy both copies.
    pub fn logout(&self) {
        self.clear();
        info!("Administrator logged out");
    }

    fn extend(&self, session: &mut Session, now: Timestamp) {
        session.extend(now, self.config.duration);
        match self.store(session) {
            Ok(()) => debug!(
                username = %session.username,
                expires_at = %session.expires_at,
                "Session extended"
            ),
            Err(err) => warn!(error = %err, "Failed to persist session extension"),
        }
    }

    fn store(&self, session: &Session) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(session).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        self.persistent.write(&self.config.storage_key, &bytes)?;
        self.ephemeral.write(&self.config.storage_key, &bytes)
    }

    fn load(&self, scope: &dyn LocalScope, name: &'static str) -> Slot {
        match scope.read(&self.config.storage_key) {
            Ok(None) => Slot::Missing,
            Ok(Some(bytes)) => match serde_json::from_slice::<Session>(&bytes) {
                Ok(session) => Slot::Present(session),
                Err(_) => Slot::Unparsable,
            },
            Err(err) => {
                warn!(scope = name, error = %err, "Session scope unreadable");
                Slot::Missing
            }
        }
    }

    fn clear(&self) {
        for (name, scope) in [("persistent", &self.persistent), ("ephemeral", &self.ephemeral)] {
            if let Err(err) = scope.delete(&self.config.storage_key) {
                warn!(scope = name, error = %err, "Failed to clear session copy");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vigil_core::ManualClock;
    use vigil_storage::MemoryScope;

    struct Fixture {
        guard: SessionGuard,
        persistent: Arc<MemoryScope>,
        ephemeral: Arc<MemoryScope>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let persistent = Arc::new(MemoryScope::new());
        let ephemeral = Arc::new(MemoryScope::new());
        let clock = ManualClock::starting_now();
        let guard = SessionGuard::new(
            persistent.clone(),
            ephemeral.clone(),
            SessionConfig::default(),
            Arc::new(clock.clone()),
        );
        Fixture {
            guard,
            persistent,
            ephemeral,
            clock,
        }
    }

    fn key() -> String {
        SessionConfig::default().storage_key
    }

    fn stored(scope: &MemoryScope) -> Option<Session> {
        scope
            .read(&key())
            .expect("read should succeed")
            .map(|bytes| serde_json::from_slice(&bytes).expect("session should parse"))
    }

    #[test]
    fn test_absent_without_login() {
        let f = fixture();
        assert_eq!(f.guard.validate(), SessionStatus::Absent);
        assert_eq!(
            f.guard.require_for_action(ModerationAction::Approve),
            Err(SessionError::Absent)
        );
    }

    #[test]
    fn test_create_writes_identical_copies() {
        let f = fixture();
        let session = f.guard.create_session("admin").expect("create should succeed");
        assert_eq!(stored(&f.persistent), Some(session.clone()));
        assert_eq!(stored(&f.ephemeral), Some(session.clone()));
        assert_eq!(
            session.expires_at - session.issued_at,
            chrono::Duration::hours(4)
        );
        assert!(f.guard.validate().is_valid());
    }

    #[test]
    fn test_orphaned_copy_is_cleared() {
        let f = fixture();
        f.guard.create_session("admin").expect("create should succeed");
        f.ephemeral.clear();

        assert_eq!(f.guard.validate(), SessionStatus::Absent);
        assert!(f.persistent.is_empty());
    }

    #[test]
    fn test_corrupted_username_is_tampering() {
        let f = fixture();
        let mut session = f.guard.create_session("admin").expect("create should succeed");
        session.username = "intruder".into();
        f.persistent
            .write(&key(), &serde_json::to_vec(&session).expect("serialize should succeed"))
            .expect("write should succeed");

        assert_eq!(f.guard.validate(), SessionStatus::Tampered);
        assert!(f.persistent.is_empty());
        assert!(f.ephemeral.is_empty());
        assert_eq!(f.guard.validate(), SessionStatus::Absent);
    }

    #[test]
    fn test_unparsable_copy_is_tampering() {
        let f = fixture();
        f.guard.create_session("admin").expect("create should succeed");
        f.ephemeral.write(&key(), b"{}").expect("write should succeed");

        assert_eq!(f.guard.validate(), SessionStatus::Tampered);
        assert!(f.persistent.is_empty());
    }

    #[test]
    fn test_low_remaining_time_is_extended() {
        let f = fixture();
        f.guard.create_session("admin").expect("create should succeed");
        f.clock.advance(Duration::from_secs(4 * 3600 - 60));

        let session = f
            .guard
            .validate()
            .into_session()
            .expect("session should be valid");
        assert_eq!(session.remaining(f.clock.now()), Duration::from_secs(4 * 3600));
        assert_eq!(stored(&f.persistent), Some(session.clone()));
        assert_eq!(stored(&f.ephemeral), Some(session));
    }

    #[test]
    fn test_expired_session_is_never_extended() {
        let f = fixture();
        f.guard.create_session("admin").expect("create should succeed");
        f.clock.advance(Duration::from_secs(4 * 3600));

        assert_eq!(
            f.guard.validate(),
            SessionStatus::Expired {
                username: "admin".into()
            }
        );
        assert!(f.persistent.is_empty());
        assert!(f.ephemeral.is_empty());
    }

    #[test]
    fn test_refresh_interval_extends_fresh_sessions() {
        let f = fixture();
        let created = f.guard.create_session("admin").expect("create should succeed");

        f.clock.advance(Duration::from_secs(60));
        let early = f.guard.validate().into_session().expect("valid");
        assert_eq!(early.expires_at, created.expires_at);

        f.clock.advance(Duration::from_secs(5 * 60));
        let refreshed = f.guard.validate().into_session().expect("valid");
        assert!(refreshed.expires_at > created.expires_at);
    }

    #[test]
    fn test_grant_carries_session_details() {
        let f = fixture();
        f.guard.create_session("admin").expect("create should succeed");
        let grant = f
            .guard
            .require_for_action(ModerationAction::Reject)
            .expect("grant should be issued");
        assert_eq!(grant.username(), "admin");
        assert_eq!(grant.action(), ModerationAction::Reject);
        assert!(grant.session_expires_at() > grant.granted_at());
    }

    #[test]
    fn test_logout_clears_both_scopes() {
        let f = fixture();
        f.guard.create_session("admin").expect("create should succeed");
        f.guard.logout();
        assert!(f.persistent.is_empty());
        assert!(f.ephemeral.is_empty());
        assert_eq!(
            f.guard.require_for_action(ModerationAction::Approve),
            Err(SessionError::Absent)
        );
    }
}
