//! Integration tests for the dual-scope administrator session.

use std::time::Duration;

use proptest::prelude::*;
use vigil_core::{Session, SessionError, SessionStatus};
use vigil_service::ModerationAction;
use vigil_test_utils::{Clock, Harness, LocalScope};

fn stored(scope: &dyn LocalScope, key: &str) -> Option<Session> {
    scope
        .read(key)
        .expect("memory scope should be readable")
        .map(|bytes| serde_json::from_slice(&bytes).expect("stored session should parse"))
}

fn session_key(harness: &Harness) -> String {
    harness.services.config.session.storage_key.clone()
}

fn lifetime(harness: &Harness) -> Duration {
    harness.services.config.session.duration
}

// ============================================================================
// TAMPER DETECTION
// ============================================================================

#[test]
fn test_corrupted_username_is_tampering() {
    let harness = Harness::new();
    harness.login();
    let key = session_key(&harness);

    let mut forged = stored(&*harness.persistent, &key).expect("session stored");
    forged.username = "intruder".to_string();
    harness
        .persistent
        .write(&key, &serde_json::to_vec(&forged).expect("serialize session"))
        .expect("write should succeed");

    assert_eq!(harness.services.guard.validate(), SessionStatus::Tampered);
    assert!(stored(&*harness.persistent, &key).is_none());
    assert!(stored(&*harness.ephemeral, &key).is_none());
    assert_eq!(
        harness
            .services
            .guard
            .require_for_action(ModerationAction::Approve)
            .err(),
        Some(SessionError::Absent)
    );
}

#[test]
fn test_garbage_in_one_scope_is_tampering() {
    let harness = Harness::new();
    harness.login();
    let key = session_key(&harness);

    harness
        .ephemeral
        .write(&key, b"{\"username\": 42")
        .expect("write should succeed");

    assert_eq!(harness.services.guard.validate(), SessionStatus::Tampered);
    assert!(stored(&*harness.persistent, &key).is_none());
}

#[test]
fn test_orphaned_copy_is_absent_and_cleared() {
    let harness = Harness::new();
    harness.login();
    let key = session_key(&harness);

    harness.ephemeral.delete(&key).expect("delete should succeed");

    assert_eq!(harness.services.guard.validate(), SessionStatus::Absent);
    assert!(stored(&*harness.persistent, &key).is_none());
}

// ============================================================================
// EXPIRY AND EXTENSION
// ============================================================================

#[test]
fn test_one_minute_left_is_extended() {
    let harness = Harness::new();
    harness.login();
    harness
        .clock
        .advance(lifetime(&harness) - Duration::from_secs(60));
    let now = harness.clock.now();

    let session = harness
        .services
        .guard
        .validate()
        .into_session()
        .expect("session still valid");

    let expected = now + chrono::Duration::from_std(lifetime(&harness)).expect("lifetime fits");
    assert_eq!(session.expires_at, expected);

    // Both copies carry the new expiry
    let key = session_key(&harness);
    for scope in [&*harness.persistent, &*harness.ephemeral] {
        assert_eq!(stored(scope, &key).map(|s| s.expires_at), Some(expected));
    }
}

#[test]
fn test_no_time_left_is_expired_and_never_extended() {
    let harness = Harness::new();
    harness.login();
    harness.clock.advance(lifetime(&harness));

    assert_eq!(
        harness.services.guard.validate(),
        SessionStatus::Expired {
            username: "admin".to_string()
        }
    );
    let key = session_key(&harness);
    assert!(stored(&*harness.persistent, &key).is_none());
    assert!(stored(&*harness.ephemeral, &key).is_none());
}

#[test]
fn test_grant_extends_a_session_close_to_expiry() {
    let harness = Harness::new();
    harness.login();
    harness
        .clock
        .advance(lifetime(&harness) - Duration::from_secs(5 * 60));

    let grant = harness
        .services
        .guard
        .require_for_action(ModerationAction::Approve)
        .expect("old but valid session is never refused");

    let remaining = (grant.session_expires_at() - harness.clock.now())
        .to_std()
        .expect("expiry in the future");
    assert!(remaining >= harness.services.config.session.low_water_mark);
}

#[test]
fn test_logout_clears_both_scopes() {
    let harness = Harness::new();
    harness.login();
    harness.services.guard.logout();

    let key = session_key(&harness);
    assert!(stored(&*harness.persistent, &key).is_none());
    assert!(stored(&*harness.ephemeral, &key).is_none());
    assert_eq!(harness.services.guard.validate(), SessionStatus::Absent);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Untouched sessions are valid for their whole lifetime and expired
    /// from the moment it ends.
    #[test]
    fn prop_session_lifetime(elapsed_secs in 0u64..(8 * 3600)) {
        let harness = Harness::new();
        harness.login();
        let lifetime = lifetime(&harness);
        harness.clock.advance(Duration::from_secs(elapsed_secs));

        let status = harness.services.guard.validate();
        if Duration::from_secs(elapsed_secs) < lifetime {
            prop_assert!(status.is_valid());
        } else {
            let is_expired = matches!(status, SessionStatus::Expired { .. });
            prop_assert!(is_expired);
        }
    }

    /// Any divergence in username is caught, whichever scope is forged.
    #[test]
    fn prop_forged_username_is_tampering(
        forged_name in "[a-z]{1,12}",
        forge_persistent in any::<bool>(),
    ) {
        prop_assume!(forged_name != "admin");
        let harness = Harness::new();
        harness.login();
        let key = session_key(&harness);

        let scope: &dyn LocalScope = if forge_persistent {
            &*harness.persistent
        } else {
            &*harness.ephemeral
        };
        let mut forged = stored(scope, &key).expect("session stored");
        forged.username = forged_name;
        scope
            .write(&key, &serde_json::to_vec(&forged).expect("serialize session"))
            .expect("write should succeed");

        prop_assert_eq!(harness.services.guard.validate(), SessionStatus::Tampered);
    }
}
