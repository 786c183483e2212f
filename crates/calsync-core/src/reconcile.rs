//! Reconciliation of source and destination events.
//!
//! Both sides are indexed by [`Fingerprint`]. Because every synced field takes
//! part in the fingerprint, a changed source event shows up as one destination
//! event to delete plus one source event to create. There is never an in-place
//! update, which keeps the diff stateless: running it again on the result of a
//! completed sync yields an empty plan.

use std::collections::HashMap;

use tracing::warn;

use crate::event::{NormalizedEvent, TargetEvent};
use crate::fingerprint::Fingerprint;
use crate::time::SyncWindow;

/// Source events keyed by fingerprint.
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    events: HashMap<Fingerprint, NormalizedEvent>,
}

impl SourceIndex {
    /// Indexes source events. Identical events collapse into one entry.
    pub fn from_events(events: impl IntoIterator<Item = NormalizedEvent>) -> Self {
        let events = events
            .into_iter()
            .map(|event| (Fingerprint::of(&event), event))
            .collect();
        Self { events }
    }

    /// Returns the number of distinct source events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if there are no source events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true if an event with this fingerprint exists.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.events.contains_key(fingerprint)
    }

    /// Iterates over the indexed events.
    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &NormalizedEvent)> {
        self.events.iter()
    }
}

/// Destination events keyed by the fingerprint stored in their description.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    events: HashMap<Fingerprint, TargetEvent>,
}

impl TargetIndex {
    /// Indexes destination events.
    ///
    /// When two events carry the same fingerprint the later one wins.
    pub fn from_events(events: impl IntoIterator<Item = TargetEvent>) -> Self {
        let mut index = HashMap::new();
        for event in events {
            if let Some(previous) = index.insert(event.fingerprint.clone(), event) {
                warn!(
                    external_id = %previous.external_id,
                    fingerprint = %previous.fingerprint.short(),
                    "duplicate fingerprint in destination calendar"
                );
            }
        }
        Self { events: index }
    }

    /// Returns the number of indexed destination events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if there are no destination events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns true if an event with this fingerprint exists.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.events.contains_key(fingerprint)
    }

    /// Iterates over the indexed events.
    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &TargetEvent)> {
        self.events.iter()
    }
}

/// The actions needed to bring the destination in line with the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Source events missing from the destination.
    pub to_create: Vec<(Fingerprint, NormalizedEvent)>,
    /// Destination events no longer present in the source.
    pub to_delete: Vec<TargetEvent>,
    /// Always empty: a change is expressed as a delete plus a create.
    pub to_update: Vec<TargetEvent>,
}

impl SyncPlan {
    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty() && self.to_update.is_empty()
    }

    /// Returns the number of API calls the plan requires.
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_delete.len() + self.to_update.len()
    }
}

/// Compares source and destination and returns the actions to apply.
///
/// Destination events whose start lies outside `window` are never scheduled
/// for deletion, even when the source no longer has them. Both lists are
/// ordered by start time, then fingerprint.
pub fn reconcile(source: &SourceIndex, target: &TargetIndex, window: &SyncWindow) -> SyncPlan {
    let mut to_create: Vec<_> = source
        .iter()
        .filter(|(fingerprint, _)| !target.contains(fingerprint))
        .map(|(fingerprint, event)| (fingerprint.clone(), event.clone()))
        .collect();

    let mut to_delete: Vec<_> = target
        .iter()
        .filter(|(fingerprint, _)| !source.contains(fingerprint))
        .filter(|(_, existing)| window.contains(&existing.event.start))
        .map(|(_, existing)| existing.clone())
        .collect();

    to_create.sort_by(|(fa, a), (fb, b)| a.start.cmp(&b.start).then_with(|| fa.cmp(fb)));
    to_delete.sort_by(|a, b| {
        a.event
            .start
            .cmp(&b.event.start)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });

    SyncPlan {
        to_create,
        to_delete,
        to_update: Vec::new(),
    }
}
