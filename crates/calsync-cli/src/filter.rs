//! Subject and all-day filtering of source events.

use calsync_core::NormalizedEvent;
use regex::{Regex, RegexBuilder};

/// Decides which source events are copied.
///
/// Subject patterns are case-insensitive regexes. An empty include list
/// accepts every subject; any matching exclude pattern rejects the event.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    skip_all_day: bool,
}

impl EventFilter {
    /// Compiles the subject patterns.
    pub fn new(
        include: &[String],
        exclude: &[String],
        skip_all_day: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
            skip_all_day,
        })
    }

    /// Returns true if the event should be synced.
    pub fn matches(&self, event: &NormalizedEvent) -> bool {
        if self.skip_all_day && event.is_all_day() {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(&event.subject)) {
            return false;
        }
        !self.exclude.iter().any(|re| re.is_match(&event.subject))
    }

    /// Returns true if the filter accepts everything.
    pub fn is_pass_through(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty() && !self.skip_all_day
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
        .collect()
}
