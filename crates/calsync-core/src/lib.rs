//! Core types: time window, events, fingerprints, reconciliation

pub mod event;
pub mod fingerprint;
pub mod reconcile;
pub mod time;
pub mod tracing;

pub use event::{EmailAddress, InvalidEmail, NormalizedEvent, ResponseStatus, TargetEvent};
pub use fingerprint::Fingerprint;
pub use reconcile::{SourceIndex, SyncPlan, TargetIndex, reconcile};
pub use time::{EventTime, SyncWindow};
pub use tracing::{TracingConfig, TracingError, TracingGuard, init_tracing};
