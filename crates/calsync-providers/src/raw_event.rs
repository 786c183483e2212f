//! Events as the source server reports them.
//!
//! A [`RawEvent`] is still unvalidated: attendee addresses are plain strings
//! and all-day detection has not run yet. [`crate::normalize`] turns it into
//! a [`NormalizedEvent`](calsync_core::NormalizedEvent).

use calsync_core::ResponseStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The start or end of a raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum RawEventTime {
    /// An instant.
    DateTime(DateTime<Utc>),
    /// A calendar date without a time of day.
    Date(NaiveDate),
}

impl RawEventTime {
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::Date(date)
    }

    /// Returns true for a bare date.
    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}

/// A person invited to a source event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAttendee {
    /// Address as sent by the server. May be empty or malformed.
    pub email: String,
    pub display_name: Option<String>,
    pub organizer: bool,
    pub optional: bool,
    pub response_status: ResponseStatus,
}

impl RawAttendee {
    /// A required attendee who has not answered.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
            organizer: false,
            optional: false,
            response_status: ResponseStatus::NeedsAction,
        }
    }

    /// The organizer, who counts as having accepted.
    pub fn organizer(email: impl Into<String>) -> Self {
        Self {
            organizer: true,
            response_status: ResponseStatus::Accepted,
            ..Self::new(email)
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_response(mut self, status: ResponseStatus) -> Self {
        self.response_status = status;
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

/// One occurrence read from the source calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Server-side item id, used only for logging.
    pub id: String,
    pub start: RawEventTime,
    pub end: RawEventTime,
    pub summary: Option<String>,
    pub location: Option<String>,
    /// The server's all-day flag. `None` when the server did not say.
    pub all_day: Option<bool>,
    /// The organizer cancelled this occurrence.
    pub cancelled: bool,
    /// Organizer first when known, then required and optional attendees.
    pub attendees: Vec<RawAttendee>,
}

impl RawEvent {
    pub fn new(id: impl Into<String>, start: RawEventTime, end: RawEventTime) -> Self {
        Self {
            id: id.into(),
            start,
            end,
            summary: None,
            location: None,
            all_day: None,
            cancelled: false,
            attendees: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = Some(all_day);
        self
    }

    pub fn with_attendee(mut self, attendee: RawAttendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    pub fn with_cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }
}
