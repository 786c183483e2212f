//! Calendar traits used by the sync pass.
//!
//! - [`SourceCalendar`]: the read-only side events are copied from
//! - [`TargetCalendar`]: the side events are copied to, which must be able to
//!   list, create and delete them
//!
//! Both traits return boxed futures so the sync pass can hold them as trait
//! objects.

use std::future::Future;
use std::pin::Pin;

use calsync_core::{Fingerprint, NormalizedEvent, SyncWindow, TargetEvent};

use crate::error::ProviderResult;
use crate::raw_event::RawEvent;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A calendar events are read from.
pub trait SourceCalendar: Send + Sync {
    /// Returns the name of this calendar backend (e.g. "exchange").
    fn name(&self) -> &str;

    /// Lists every event whose occurrence overlaps `window`.
    ///
    /// Recurring events are returned as individual occurrences and pagination
    /// is handled internally.
    fn list_events<'a>(
        &'a self,
        window: &'a SyncWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<RawEvent>>>;
}

/// A calendar events are written to.
pub trait TargetCalendar: Send + Sync {
    /// Returns the name of this calendar backend (e.g. "google").
    fn name(&self) -> &str;

    /// Lists the events in `window` that carry a fingerprint marker.
    ///
    /// Events without a marker were not created by calsync and are left out.
    fn list_events<'a>(
        &'a self,
        window: &'a SyncWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<TargetEvent>>>;

    /// Creates an event and returns its identifier.
    ///
    /// The event description is set to the fingerprint marker.
    fn create_event<'a>(
        &'a self,
        event: &'a NormalizedEvent,
        fingerprint: &'a Fingerprint,
    ) -> BoxFuture<'a, ProviderResult<String>>;

    /// Deletes an event. Deleting an event that is already gone succeeds.
    fn delete_event<'a>(&'a self, external_id: &'a str) -> BoxFuture<'a, ProviderResult<()>>;
}
