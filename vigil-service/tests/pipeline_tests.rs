//! Integration tests for the persistence pipeline.
//!
//! Timer-driven: every test runs on a paused tokio clock, so backoff sleeps
//! and attempt timeouts elapse instantly while `Instant::elapsed` still
//! reports the virtual time that passed.

use std::time::Duration;

use tokio::time::Instant;
use vigil_core::{AttemptOutcome, Partition, StoreError, SubmissionError};
use vigil_service::{ProgressEvent, RawSubmission, RequiredFieldsValidator};
use vigil_test_utils::fixtures::{sample_draft, sample_raw, unavailable};
use vigil_test_utils::{Harness, Step};

// ============================================================================
// RETRY AND BACKOFF
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fails_twice_then_succeeds() {
    let harness = Harness::new();
    harness
        .store
        .script_inserts([Step::Fail(unavailable()), Step::Fail(unavailable())]);
    let base = harness.services.config.retry.initial_backoff;

    let start = Instant::now();
    let receipt = harness
        .services
        .pipeline
        .submit(sample_draft("Rasha Khalil"))
        .await
        .expect("third attempt should succeed");

    assert_eq!(harness.store.insert_calls(), 3);
    assert_eq!(receipt.attempts.len(), 3);
    assert!(receipt.attempts[2].succeeded());
    assert!(start.elapsed() >= base + base * 2);

    let stored = harness.store.inner().records(Partition::Pending);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id(), &receipt.id);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_announced_with_growing_delays() {
    let harness = Harness::new();
    harness
        .store
        .script_inserts([Step::Fail(unavailable()), Step::Fail(unavailable())]);

    harness
        .services
        .pipeline
        .submit(sample_draft("Omar Haddad"))
        .await
        .expect("submission should succeed");

    assert_eq!(
        harness.sink.retries(),
        vec![(2, Duration::from_secs(1)), (3, Duration::from_secs(2))]
    );
    assert!(harness
        .sink
        .events()
        .iter()
        .any(|event| matches!(event, ProgressEvent::SubmissionAccepted { attempts: 3, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_store_exhausts_attempts() {
    let harness = Harness::new();
    harness.store.fail_all_inserts(Some(unavailable()));
    let max_attempts = harness.services.config.retry.max_attempts;

    let draft = sample_draft("Mona Saleh");
    let key = draft.submission_key.clone();
    let err = harness
        .services
        .pipeline
        .submit(draft)
        .await
        .expect_err("every attempt fails");

    match err {
        SubmissionError::PermanentFailure {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts.len(), max_attempts as usize);
            assert_eq!(last_error, unavailable());
            assert!(attempts.last().map(|a| a.backoff.is_none()).unwrap_or(false));
        }
        other => panic!("expected PermanentFailure, got {:?}", other),
    }
    assert_eq!(harness.store.insert_calls(), max_attempts);
    assert!(harness.services.pipeline.preserved_draft(&key).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_error_stops_immediately() {
    let harness = Harness::new();
    harness.store.script_inserts([Step::Fail(StoreError::Rejected {
        reason: "quota exceeded".into(),
    })]);

    let start = Instant::now();
    let err = harness
        .services
        .pipeline
        .submit(sample_draft("Yusuf Nasser"))
        .await
        .expect_err("rejection is final");

    assert!(matches!(
        err,
        SubmissionError::PermanentFailure {
            last_error: StoreError::Rejected { .. },
            ..
        }
    ));
    assert_eq!(harness.store.insert_calls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert!(harness.sink.retries().is_empty());
}

// ============================================================================
// TIMEOUTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_attempts_time_out_with_growing_budgets() {
    let harness = Harness::new();
    harness.store.script_inserts([
        Step::Delay(Duration::from_secs(25)),
        Step::Delay(Duration::from_secs(35)),
        Step::Delay(Duration::from_secs(5)),
    ]);

    let receipt = harness
        .services
        .pipeline
        .submit(sample_draft("Laila Odeh"))
        .await
        .expect("third attempt fits its budget");

    let budgets: Vec<Duration> = receipt.attempts.iter().map(|a| a.timeout).collect();
    assert_eq!(
        budgets,
        vec![
            Duration::from_secs(20),
            Duration::from_secs(30),
            Duration::from_secs(40)
        ]
    );
    assert_eq!(receipt.attempts[0].outcome, AttemptOutcome::TimedOut);
    assert_eq!(receipt.attempts[1].outcome, AttemptOutcome::TimedOut);
    assert_eq!(receipt.attempts[2].outcome, AttemptOutcome::Success);

    // The abandoned attempts never land
    let stored = harness.store.inner().records(Partition::Pending);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id(), &receipt.id);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_surface_as_timeout_errors() {
    let harness = Harness::new();
    harness.store.script_inserts([
        Step::Delay(Duration::from_secs(60)),
        Step::Delay(Duration::from_secs(60)),
        Step::Delay(Duration::from_secs(60)),
    ]);

    let err = harness
        .services
        .pipeline
        .submit(sample_draft("Hani Darwish"))
        .await
        .expect_err("every attempt times out");

    match err {
        SubmissionError::PermanentFailure { last_error, .. } => assert_eq!(
            last_error,
            StoreError::Timeout {
                after: Duration::from_secs(40)
            }
        ),
        other => panic!("expected PermanentFailure, got {:?}", other),
    }
    assert_eq!(harness.store.inner().count(Partition::Pending), 0);
}

// ============================================================================
// DRAFTS AND THE MIRROR
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_preserved_draft_is_cleared_by_later_success() {
    let harness = Harness::new();
    harness.store.fail_all_inserts(Some(unavailable()));

    let draft = sample_draft("Samir Awad");
    let key = draft.submission_key.clone();
    let _ = harness.services.pipeline.submit(draft).await;

    let preserved = harness
        .services
        .pipeline
        .preserved_draft(&key)
        .expect("draft should be preserved");

    harness.store.fail_all_inserts(None);
    harness
        .services
        .pipeline
        .submit(preserved)
        .await
        .expect("store is back");

    assert!(harness.services.pipeline.preserved_draft(&key).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_submission_never_reaches_the_mirror() {
    let harness = Harness::new();
    let warmed = harness
        .services
        .moderation
        .pending_records()
        .await
        .expect("query should succeed");
    assert!(warmed.is_empty());

    harness.store.fail_all_inserts(Some(unavailable()));
    let _ = harness
        .services
        .pipeline
        .submit(sample_draft("Nadia Karam"))
        .await;

    assert_eq!(
        harness.services.mirror.list(Partition::Pending),
        Some(Vec::new())
    );
}

#[tokio::test(start_paused = true)]
async fn test_success_writes_through_to_cached_pending_list() {
    let harness = Harness::new();
    harness
        .services
        .moderation
        .pending_records()
        .await
        .expect("query should succeed");

    let receipt = harness
        .services
        .pipeline
        .submit(sample_draft("Tariq Mansour"))
        .await
        .expect("submission should succeed");

    assert!(harness
        .services
        .mirror
        .find(Partition::Pending, &receipt.id)
        .is_some());
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_invalid_submission_never_enters_the_retry_loop() {
    let harness = Harness::new();
    let raw = RawSubmission {
        full_name: Some("   ".into()),
        martyrdom_date: Some("10/02/2024".into()),
        ..Default::default()
    };

    let err = harness
        .services
        .pipeline
        .submit_raw(&RequiredFieldsValidator::default(), &raw)
        .await
        .expect_err("blank name and bad date");

    match err {
        SubmissionError::Validation(errors) => {
            let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
            assert!(fields.contains(&"fullName"));
            assert!(fields.contains(&"martyrdomDate"));
        }
        other => panic!("expected Validation, got {:?}", other),
    }
    assert_eq!(harness.store.insert_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_valid_raw_submission_is_trimmed_and_stored() {
    let harness = Harness::new();

    let receipt = harness
        .services
        .pipeline
        .submit_raw(&RequiredFieldsValidator::default(), &sample_raw("Huda Shawa"))
        .await
        .expect("raw submission should be accepted");

    let stored = harness.store.inner().records(Partition::Pending);
    assert_eq!(stored[0].id(), &receipt.id);
    assert_eq!(stored[0].fields.full_name, "Huda Shawa");
}
