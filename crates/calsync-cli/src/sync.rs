//! One sync pass from a source calendar to a target calendar.
//!
//! The pass reads both sides, computes a [`SyncPlan`] and applies it: every
//! create first, then every delete. The first failing request aborts the
//! pass; changes already applied stay in place.

use calsync_core::{SourceIndex, SyncPlan, SyncWindow, TargetIndex, reconcile};
use calsync_providers::{SourceCalendar, TargetCalendar, normalize_events};
use tracing::{debug, info};

use crate::error::SyncResult;
use crate::filter::EventFilter;

/// Counts from a finished pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Distinct source events in the window after filtering.
    pub source_events: usize,
    /// Source events rejected by the filter.
    pub filtered: usize,
    /// Marked events found in the target.
    pub target_events: usize,
    /// Events created, or that would be created in a dry run.
    pub created: usize,
    /// Events deleted, or that would be deleted in a dry run.
    pub deleted: usize,
    /// Whether writes were skipped.
    pub dry_run: bool,
}

/// Runs one pass over `window`.
pub async fn run_sync(
    source: &dyn SourceCalendar,
    target: &dyn TargetCalendar,
    window: &SyncWindow,
    filter: &EventFilter,
    dry_run: bool,
) -> SyncResult<SyncReport> {
    info!(
        source = source.name(),
        target = target.name(),
        start = %window.start,
        end = %window.end,
        dry_run,
        "starting sync"
    );

    let raw = source.list_events(window).await?;
    let normalized = normalize_events(&raw, &window.timezone);

    let mut filtered = 0;
    let in_window = normalized.into_iter().filter(|event| {
        if !window.contains(&event.start) {
            return false;
        }
        if !filter.matches(event) {
            debug!(subject = %event.subject, "filtered out");
            filtered += 1;
            return false;
        }
        true
    });
    let source_index = SourceIndex::from_events(in_window);

    let target_index = TargetIndex::from_events(target.list_events(window).await?);
    info!(
        source = source_index.len(),
        target = target_index.len(),
        filtered,
        "loaded events"
    );

    let plan = reconcile(&source_index, &target_index, window);
    let report = SyncReport {
        source_events: source_index.len(),
        filtered,
        target_events: target_index.len(),
        created: plan.to_create.len(),
        deleted: plan.to_delete.len(),
        dry_run,
    };

    if plan.is_empty() {
        info!("target calendar is up to date");
        return Ok(report);
    }

    if dry_run {
        log_plan(&plan);
    } else {
        apply(target, &plan).await?;
    }

    info!(
        created = report.created,
        deleted = report.deleted,
        dry_run,
        "sync finished"
    );
    Ok(report)
}

async fn apply(target: &dyn TargetCalendar, plan: &SyncPlan) -> SyncResult<()> {
    for (fingerprint, event) in &plan.to_create {
        let id = target.create_event(event, fingerprint).await?;
        debug!(
            id = %id,
            fingerprint = %fingerprint.short(),
            subject = %event.subject,
            "created event"
        );
    }

    for existing in &plan.to_delete {
        target.delete_event(&existing.external_id).await?;
        debug!(
            id = %existing.external_id,
            fingerprint = %existing.fingerprint.short(),
            subject = %existing.event.subject,
            "deleted event"
        );
    }

    Ok(())
}

fn log_plan(plan: &SyncPlan) {
    for (fingerprint, event) in &plan.to_create {
        info!(
            fingerprint = %fingerprint.short(),
            subject = %event.subject,
            "would create event"
        );
    }
    for existing in &plan.to_delete {
        info!(
            id = %existing.external_id,
            subject = %existing.event.subject,
            "would delete event"
        );
    }
}
