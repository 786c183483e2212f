//! Event fingerprints.
//!
//! A [`Fingerprint`] is the SHA-256 of a canonical JSON encoding of the synced
//! fields of a [`NormalizedEvent`]. It is written into the description of every
//! event the sync creates, prefixed with [`Fingerprint::MARKER_PREFIX`], and
//! read back on the next run to detect what changed.

use std::fmt;

use chrono::SecondsFormat;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::event::NormalizedEvent;
use crate::time::EventTime;

/// Deterministic hash of an event's synced fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

/// The hashed payload. Field order is part of the format.
#[derive(Serialize)]
struct Canonical<'a> {
    subject: &'a str,
    location: &'a str,
    start: String,
    end: String,
    attendees: Vec<&'a str>,
}

impl Fingerprint {
    /// Prefix that marks a description as carrying a fingerprint.
    pub const MARKER_PREFIX: &'static str = "calsync:v1:";

    /// Length of the hex-encoded digest.
    pub const HEX_LEN: usize = 64;

    /// Computes the fingerprint of an event.
    ///
    /// Attendee addresses are hashed in sorted order. Responses and the
    /// description are never part of the input.
    pub fn of(event: &NormalizedEvent) -> Self {
        let canonical = Canonical {
            subject: &event.subject,
            location: &event.location,
            start: canonical_time(&event.start),
            end: canonical_time(&event.end),
            // BTreeMap keys iterate in sorted order
            attendees: event.attendees.keys().map(|a| a.as_str()).collect(),
        };

        let payload =
            serde_json::to_vec(&canonical).expect("serializing string fields cannot fail");
        let digest = Sha256::digest(&payload);
        Self(format!("{:x}", digest))
    }

    /// Parses a destination description written by [`Self::to_description`].
    ///
    /// Returns `None` for descriptions this tool did not write.
    pub fn from_description(description: &str) -> Option<Self> {
        let hex = description.trim().strip_prefix(Self::MARKER_PREFIX)?;
        if hex.len() == Self::HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Returns the description to store on the destination event.
    pub fn to_description(&self) -> String {
        format!("{}{}", Self::MARKER_PREFIX, self.0)
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a shortened form for log output.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical_time(time: &EventTime) -> String {
    match time {
        EventTime::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        EventTime::AllDay(date) => date.format("%Y-%m-%d").to_string(),
    }
}
