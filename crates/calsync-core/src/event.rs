//! Event types shared by both sides of a sync.
//!
//! - [`NormalizedEvent`]: the canonical record built from a source event
//! - [`TargetEvent`]: an event read back from the destination calendar
//! - [`EmailAddress`]: an attendee address that passed validation
//! - [`ResponseStatus`]: how an attendee answered the invitation

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::time::EventTime;

/// The HTML5 "valid e-mail address" grammar, with at least one dot in the
/// domain part.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$",
    )
    .expect("Invalid email regex")
});

/// Error returned when an attendee address does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid email address: {0:?}")]
pub struct InvalidEmail(pub String);

/// A syntactically valid email address, trimmed and lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validates and normalizes an address.
    pub fn parse(raw: &str) -> Result<Self, InvalidEmail> {
        let normalized = raw.trim().to_lowercase();
        if EMAIL_REGEX.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(InvalidEmail(raw.to_string()))
        }
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EmailAddress {
    type Err = InvalidEmail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = InvalidEmail;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An attendee's answer to an invitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    /// No answer yet.
    #[default]
    NeedsAction,
    /// The attendee accepted.
    Accepted,
    /// The attendee tentatively accepted.
    Tentative,
    /// The attendee declined.
    Declined,
}

impl ResponseStatus {
    /// Returns the name used by calendar APIs (`needsAction`, `accepted`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsAction => "needsAction",
            Self::Accepted => "accepted",
            Self::Tentative => "tentative",
            Self::Declined => "declined",
        }
    }

    /// Parses an API name, falling back to [`ResponseStatus::NeedsAction`].
    pub fn from_api(value: &str) -> Self {
        match value {
            "accepted" => Self::Accepted,
            "tentative" => Self::Tentative,
            "declined" => Self::Declined,
            _ => Self::NeedsAction,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical form of a calendar event.
///
/// Only the synced fields are kept. Descriptions and attachments never take
/// part in a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// The event title.
    pub subject: String,
    /// The event location, empty when unset.
    pub location: String,
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends.
    pub end: EventTime,
    /// Attendees with a valid address and their response.
    ///
    /// Only the addresses take part in the fingerprint.
    pub attendees: BTreeMap<EmailAddress, ResponseStatus>,
}

impl NormalizedEvent {
    /// Creates a new event without location or attendees.
    pub fn new(subject: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            subject: subject.into(),
            location: String::new(),
            start,
            end,
            attendees: BTreeMap::new(),
        }
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Builder method to add an attendee who has not answered yet.
    pub fn with_attendee(self, attendee: EmailAddress) -> Self {
        self.with_response(attendee, ResponseStatus::NeedsAction)
    }

    /// Builder method to add an attendee with a response.
    ///
    /// A repeated address keeps the last response.
    pub fn with_response(mut self, attendee: EmailAddress, status: ResponseStatus) -> Self {
        self.attendees.insert(attendee, status);
        self
    }

    /// Returns true if this is an all-day event.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Computes the fingerprint of this event.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// An event owned by the destination calendar that carries a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEvent {
    /// Identifier assigned by the destination calendar.
    pub external_id: String,
    /// The fingerprint stored in the event description.
    pub fingerprint: Fingerprint,
    /// The synced fields as currently stored in the destination.
    pub event: NormalizedEvent,
}

impl TargetEvent {
    /// Creates a new target event.
    pub fn new(
        external_id: impl Into<String>,
        fingerprint: Fingerprint,
        event: NormalizedEvent,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            fingerprint,
            event,
        }
    }
}
