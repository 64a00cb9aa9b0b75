//! Vigil Test Utilities
//!
//! Centralized test infrastructure for the Vigil workspace:
//! - A scripted remote store for failure, delay and timeout scenarios
//! - A progress sink that records every event
//! - Proptest generators for records and policies
//! - Fixtures and a fully wired harness over in-memory media

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

pub use vigil_core::{
    CacheConfig, Clock, ManualClock, Partition, Record, RecordDraft, RecordFields, RecordFilter,
    RecordId, RecordPatch, RetryConfig, StoreError, VigilConfig,
};
pub use vigil_storage::{InMemoryRemoteStore, LocalScope, MemoryScope, RemoteStore};

use vigil_service::{
    ActionGrant, ModerationAction, ProgressEvent, ProgressSink, TransitionOutcome, VigilServices,
};
use vigil_core::ModerationError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// SCRIPTED REMOTE STORE
// ============================================================================

/// What one scripted insert does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Insert immediately.
    Pass,
    /// Fail immediately.
    Fail(StoreError),
    /// Insert after a delay. Longer than the attempt budget means a timeout.
    Delay(Duration),
    /// Fail after a delay.
    DelayThenFail(Duration, StoreError),
}

/// Remote store whose failures and latencies are scripted per call.
///
/// Inserts consume the script front to back; once it is empty they fall
/// back to the standing insert failure, if any, and otherwise pass.
#[derive(Debug, Default)]
pub struct ScriptedRemoteStore {
    inner: InMemoryRemoteStore,
    insert_script: Mutex<VecDeque<Step>>,
    insert_failure: Mutex<Option<StoreError>>,
    put_failure: Mutex<Option<StoreError>>,
    delete_failure: Mutex<Option<StoreError>>,
    hang_deletes: AtomicBool,
    reject_before_put: AtomicBool,
    unreachable: AtomicBool,
    insert_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl ScriptedRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for the next inserts.
    pub fn script_inserts(&self, steps: impl IntoIterator<Item = Step>) {
        lock(&self.insert_script).extend(steps);
    }

    /// Fail every unscripted insert with `error` (or stop failing).
    pub fn fail_all_inserts(&self, error: Option<StoreError>) {
        *lock(&self.insert_failure) = error;
    }

    pub fn fail_puts(&self, error: Option<StoreError>) {
        *lock(&self.put_failure) = error;
    }

    pub fn fail_deletes(&self, error: Option<StoreError>) {
        *lock(&self.delete_failure) = error;
    }

    /// Make every delete wait forever.
    pub fn hang_deletes(&self, hang: bool) {
        self.hang_deletes.store(hang, Ordering::SeqCst);
    }

    /// Remove the record from the pending partition just before the next
    /// put lands, as a concurrent rejection would.
    pub fn reject_before_next_put(&self) {
        self.reject_before_put.store(true, Ordering::SeqCst);
    }

    /// Make every operation fail as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> u32 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// The backing store, for direct inspection.
    pub fn inner(&self) -> &InMemoryRemoteStore {
        &self.inner
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "network unreachable".to_string(),
            });
        }
        Ok(())
    }

    fn next_insert_step(&self) -> Step {
        if let Some(step) = lock(&self.insert_script).pop_front() {
            return step;
        }
        match lock(&self.insert_failure).clone() {
            Some(error) => Step::Fail(error),
            None => Step::Pass,
        }
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemoteStore {
    async fn insert(
        &self,
        partition: Partition,
        draft: &RecordDraft,
    ) -> Result<RecordId, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        match self.next_insert_step() {
            Step::Pass => {}
            Step::Fail(error) => return Err(error),
            Step::Delay(delay) => tokio::time::sleep(delay).await,
            Step::DelayThenFail(delay, error) => {
                tokio::time::sleep(delay).await;
                return Err(error);
            }
        }
        self.inner.insert(partition, draft).await
    }

    async fn put(&self, partition: Partition, record: &Record) -> Result<(), StoreError> {
        self.check_reachable()?;
        let failure = lock(&self.put_failure).clone();
        if let Some(error) = failure {
            return Err(error);
        }
        if self.reject_before_put.swap(false, Ordering::SeqCst) {
            let _ = self.inner.delete(Partition::Pending, record.id()).await;
        }
        self.inner.put(partition, record).await
    }

    async fn update(
        &self,
        partition: Partition,
        id: &RecordId,
        patch: &RecordPatch,
    ) -> Result<(), StoreError> {
        self.check_reachable()?;
        self.inner.update(partition, id, patch).await
    }

    async fn delete(&self, partition: Partition, id: &RecordId) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        let failure = lock(&self.delete_failure).clone();
        if let Some(error) = failure {
            return Err(error);
        }
        if self.hang_deletes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.delete(partition, id).await
    }

    async fn query(
        &self,
        partition: Partition,
        filter: &RecordFilter,
    ) -> Result<Vec<Record>, StoreError> {
        self.check_reachable()?;
        self.inner.query(partition, filter).await
    }
}

// ============================================================================
// RECORDING SINK
// ============================================================================

/// Progress sink that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    /// `(next_attempt, delay)` of every announced retry.
    pub fn retries(&self) -> Vec<(u32, Duration)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::RetryScheduled {
                    next_attempt,
                    delay,
                    ..
                } => Some((*next_attempt, *delay)),
                _ => None,
            })
            .collect()
    }

    /// Every moderation verdict, in order.
    pub fn verdicts(
        &self,
    ) -> Vec<(ModerationAction, RecordId, Result<TransitionOutcome, ModerationError>)> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Verdict {
                    action,
                    id,
                    outcome,
                    ..
                } => Some((*action, id.clone(), outcome.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl ProgressSink for RecordingSink {
    fn notify(&self, event: &ProgressEvent) {
        lock(&self.events).push(event.clone());
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;
    use vigil_core::Timestamp;

    /// Generate a timestamp between 2000 and 2100.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (946_684_800i64..4_102_444_800i64).prop_map(|secs| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(Utc::now)
        })
    }

    /// Generate a calendar date string (YYYY-MM-DD).
    pub fn arb_date_string() -> impl Strategy<Value = String> {
        (1930i32..2025, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "2000-01-01".to_string())
        })
    }

    /// Generate valid record fields.
    pub fn arb_record_fields() -> impl Strategy<Value = RecordFields> {
        (
            "[A-Z][a-z]{1,12} [A-Z][a-z]{1,12}",
            proptest::option::of(arb_date_string()),
            arb_date_string(),
            proptest::option::of("[A-Z][a-z]{2,15}"),
            proptest::option::of("[A-Za-z ,.]{0,200}"),
        )
            .prop_map(|(full_name, birth_date, martyrdom_date, place, biography)| {
                RecordFields {
                    full_name,
                    birth_date,
                    martyrdom_date: Some(martyrdom_date),
                    martyrdom_place: place,
                    biography,
                    ..Default::default()
                }
            })
    }

    /// Generate a draft.
    pub fn arb_record_draft() -> impl Strategy<Value = RecordDraft> {
        (arb_record_fields(), arb_timestamp())
            .prop_map(|(fields, created_at)| RecordDraft::new(fields, created_at))
    }

    /// Generate a positive TTL up to one week.
    pub fn arb_ttl() -> impl Strategy<Value = Duration> {
        (1u64..604_800).prop_map(Duration::from_secs)
    }

    /// Generate a valid retry policy.
    pub fn arb_retry_config() -> impl Strategy<Value = RetryConfig> {
        (1u32..6, 1u64..30, 0u64..15, 1u64..5_000, 1u32..4).prop_map(
            |(max_attempts, timeout_secs, step_secs, backoff_ms, multiplier)| RetryConfig {
                max_attempts,
                attempt_timeout: Duration::from_secs(timeout_secs),
                timeout_step: Duration::from_secs(step_secs),
                initial_backoff: Duration::from_millis(backoff_ms),
                max_backoff: Duration::from_millis(backoff_ms * 16),
                backoff_multiplier: multiplier as f64,
            },
        )
    }

    /// Generate a transient store error.
    pub fn arb_transient_error() -> impl Strategy<Value = StoreError> {
        prop_oneof![
            "[a-z ]{1,20}".prop_map(|reason| StoreError::Unavailable { reason }),
            (1u64..60).prop_map(|secs| StoreError::Timeout {
                after: Duration::from_secs(secs)
            }),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use chrono::Utc;
    use vigil_service::RawSubmission;

    /// Minimal valid fields for `name`.
    pub fn sample_fields(name: &str) -> RecordFields {
        RecordFields {
            full_name: name.to_string(),
            birth_date: Some("1990-04-12".to_string()),
            martyrdom_date: Some("2024-02-10".to_string()),
            martyrdom_place: Some("Gaza".to_string()),
            biography: Some(format!("{} was a nurse.", name)),
            ..Default::default()
        }
    }

    /// A draft created now.
    pub fn sample_draft(name: &str) -> RecordDraft {
        RecordDraft::new(sample_fields(name), Utc::now())
    }

    /// Raw form input that passes the default validator.
    pub fn sample_raw(name: &str) -> RawSubmission {
        RawSubmission {
            full_name: Some(format!("  {}  ", name)),
            martyrdom_date: Some("2024-02-10".to_string()),
            biography: Some("Remembered by her students.".to_string()),
            ..Default::default()
        }
    }

    pub fn unavailable() -> StoreError {
        StoreError::Unavailable {
            reason: "connection reset".to_string(),
        }
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Fully wired services over in-memory media, a manual clock, a scripted
/// store and a recording sink.
pub struct Harness {
    pub store: Arc<ScriptedRemoteStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: ManualClock,
    pub persistent: Arc<MemoryScope>,
    pub ephemeral: Arc<MemoryScope>,
    pub services: VigilServices,
}

impl Harness {
    /// Harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(VigilConfig::default())
    }

    /// Harness with an explicit configuration.
    ///
    /// # Panics
    ///
    /// If the configuration is invalid.
    pub fn with_config(config: VigilConfig) -> Self {
        let store = Arc::new(ScriptedRemoteStore::new());
        let sink = Arc::new(RecordingSink::new());
        let clock = ManualClock::starting_now();
        let persistent = Arc::new(MemoryScope::new());
        let ephemeral = Arc::new(MemoryScope::new());

        let services = VigilServices::with_parts(
            config,
            store.clone(),
            persistent.clone(),
            ephemeral.clone(),
            Arc::new(clock.clone()),
            sink.clone(),
        )
        .expect("harness configuration should be valid");

        Self {
            store,
            sink,
            clock,
            persistent,
            ephemeral,
            services,
        }
    }

    /// Log in as `admin`.
    pub fn login(&self) {
        self.services
            .guard
            .create_session("admin")
            .expect("session creation should succeed");
    }

    /// Log in if needed and obtain a grant for `action`.
    pub fn grant(&self, action: ModerationAction) -> ActionGrant {
        if !self.services.guard.validate().is_valid() {
            self.login();
        }
        self.services
            .guard
            .require_for_action(action)
            .expect("grant should be issued")
    }

    /// Insert a draft straight into the pending partition.
    pub async fn seed_pending(&self, name: &str) -> RecordId {
        self.store
            .inner()
            .insert(Partition::Pending, &fixtures::sample_draft(name))
            .await
            .expect("seed insert should succeed")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
