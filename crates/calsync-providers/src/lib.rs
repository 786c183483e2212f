//! Calendar backends for calsync.
//!
//! This crate provides both sides of a sync pass:
//!
//! - [`SourceCalendar`] - read-only calendar events are copied from
//! - [`TargetCalendar`] - calendar events are copied to
//! - [`RawEvent`] - source event data as the server returned it
//! - [`normalize_event`] - converts raw events to the synced form
//! - [`ProviderError`] - error type for provider operations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐            ┌─────────────────┐
//! │ Exchange (EWS)  │            │ Google Calendar │
//! └────────┬────────┘            └────────▲────────┘
//!          │                              │
//!          ▼                              │
//! ┌──────────────────┐          ┌─────────┴────────┐
//! │ ExchangeCalendar │          │  GoogleCalendar  │
//! └────────┬─────────┘          └─────────▲────────┘
//!          │ SourceCalendar               │ TargetCalendar
//!          ▼                              │
//!    ┌───────────┐  normalize_event()  ┌──┴──────────────┐
//!    │ RawEvent  │ ──────────────────▶ │ NormalizedEvent │
//!    └───────────┘                     └─────────────────┘
//! ```

pub mod error;
pub mod exchange;
pub mod google;
pub mod normalize;
pub mod provider;
pub mod raw_event;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use normalize::{normalize_event, normalize_events};
pub use provider::{BoxFuture, SourceCalendar, TargetCalendar};
pub use raw_event::{RawAttendee, RawEvent, RawEventTime};
