//! Vigil Service - Resilience and Integrity Layer
//!
//! The mechanisms that keep the memorial archive trustworthy:
//! - [`SessionGuard`]: dual-scope, tamper-aware administrator sessions
//! - [`PersistencePipeline`]: retrying, timeout-bounded record submission
//! - [`ModerationStateMachine`]: pending → approved/rejected across the
//!   remote store and the local mirror
//! - [`ReconciliationLog`] and the background [`jobs`] that clean up after
//!   partial failures
//!
//! [`VigilServices`] wires them together from a [`vigil_core::VigilConfig`].

pub mod jobs;
pub mod moderation;
pub mod notify;
pub mod pipeline;
pub mod reconciliation;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod validation;

pub use moderation::{Fallback, ModerationAction, ModerationStateMachine, TransitionOutcome};
pub use notify::{ProgressEvent, ProgressSink, TracingSink};
pub use pipeline::{PersistencePipeline, SubmissionReceipt};
pub use reconciliation::{ReconcileReport, ReconciliationDebt, ReconciliationLog};
pub use session::{ActionGrant, SessionGuard};
pub use state::{JobHandles, VigilServices};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use validation::{RawSubmission, RequiredFieldsValidator, Validator};
