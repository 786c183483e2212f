//! RawEvent to NormalizedEvent conversion.
//!
//! Normalization keeps only the synced fields:
//! 1. Attendees whose address fails validation are dropped
//! 2. All-day events become [`EventTime::AllDay`] dates in the configured
//!    timezone, with an exclusive end date
//! 3. Missing subject and location become empty strings

use calsync_core::{EmailAddress, EventTime, NormalizedEvent};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::raw_event::{RawEvent, RawEventTime};

/// Converts a [`RawEvent`] to a [`NormalizedEvent`].
///
/// `tz` is the timezone all-day dates are expressed in.
pub fn normalize_event(raw: &RawEvent, tz: &Tz) -> NormalizedEvent {
    let (start, end) = convert_times(raw, tz);

    let mut event = NormalizedEvent::new(raw.summary.clone().unwrap_or_default(), start, end)
        .with_location(raw.location.clone().unwrap_or_default());

    for attendee in &raw.attendees {
        match EmailAddress::parse(&attendee.email) {
            Ok(email) => event = event.with_response(email, attendee.response_status),
            Err(err) => debug!(event = %raw.id, "dropping attendee: {}", err),
        }
    }

    event
}

/// Batch normalize multiple raw events.
///
/// Cancelled events are filtered out.
pub fn normalize_events(raw_events: &[RawEvent], tz: &Tz) -> Vec<NormalizedEvent> {
    raw_events
        .iter()
        .filter(|e| !e.cancelled)
        .map(|e| normalize_event(e, tz))
        .collect()
}

fn convert_times(raw: &RawEvent, tz: &Tz) -> (EventTime, EventTime) {
    match (raw.start, raw.end) {
        (RawEventTime::Date(start), RawEventTime::Date(end)) => {
            (EventTime::from_date(start), EventTime::from_date(exclusive_end(start, end)))
        }
        (RawEventTime::DateTime(start), RawEventTime::DateTime(end))
            if is_all_day(raw.all_day, start, end, tz) =>
        {
            let first = local_date(start, tz);
            // The last instant of the event falls on the last covered day
            let last_instant = if end > start {
                end - Duration::seconds(1)
            } else {
                start
            };
            let after_last = local_date(last_instant, tz) + Duration::days(1);
            (EventTime::from_date(first), EventTime::from_date(after_last))
        }
        (start, end) => (convert_time(start), convert_time(end)),
    }
}

/// Decides whether a timed event is really an all-day event.
///
/// The server's flag wins. Without one, an event that runs from one local
/// midnight to a later local midnight counts as all-day.
fn is_all_day(flag: Option<bool>, start: DateTime<Utc>, end: DateTime<Utc>, tz: &Tz) -> bool {
    match flag {
        Some(all_day) => all_day,
        None => end > start && is_local_midnight(start, tz) && is_local_midnight(end, tz),
    }
}

fn is_local_midnight(dt: DateTime<Utc>, tz: &Tz) -> bool {
    dt.with_timezone(tz).time() == NaiveTime::MIN
}

fn local_date(dt: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    dt.with_timezone(tz).date_naive()
}

/// All-day end dates are exclusive and at least one day after the start.
fn exclusive_end(start: NaiveDate, end: NaiveDate) -> NaiveDate {
    if end > start {
        end
    } else {
        start + Duration::days(1)
    }
}

fn convert_time(raw: RawEventTime) -> EventTime {
    match raw {
        RawEventTime::DateTime(dt) => EventTime::from_utc(dt),
        RawEventTime::Date(date) => EventTime::from_date(date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_event::RawAttendee;
    use calsync_core::ResponseStatus;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn berlin() -> Tz {
        "Europe/Berlin".parse().unwrap()
    }

    fn timed(start: DateTime<Utc>, end: DateTime<Utc>) -> RawEvent {
        RawEvent::new(
            "AAMk-1",
            RawEventTime::from_datetime(start),
            RawEventTime::from_datetime(end),
        )
        .with_summary("Team Meeting")
    }

    mod attendees {
        use super::*;

        #[test]
        fn invalid_addresses_are_dropped() {
            let raw = timed(utc(2025, 2, 5, 10), utc(2025, 2, 5, 11))
                .with_attendee(RawAttendee::new("a@b.com"))
                .with_attendee(RawAttendee::new("not-an-email"));

            let event = normalize_event(&raw, &Tz::UTC);

            let emails: Vec<_> = event.attendees.keys().map(|a| a.as_str()).collect();
            assert_eq!(emails, vec!["a@b.com"]);
        }

        #[test]
        fn responses_are_kept() {
            let raw = timed(utc(2025, 2, 5, 10), utc(2025, 2, 5, 11))
                .with_attendee(RawAttendee::organizer("Boss@Example.com"))
                .with_attendee(
                    RawAttendee::new("dev@example.com").with_response(ResponseStatus::Tentative),
                );

            let event = normalize_event(&raw, &Tz::UTC);

            let boss = EmailAddress::parse("boss@example.com").unwrap();
            let dev = EmailAddress::parse("dev@example.com").unwrap();
            assert_eq!(event.attendees.get(&boss), Some(&ResponseStatus::Accepted));
            assert_eq!(event.attendees.get(&dev), Some(&ResponseStatus::Tentative));
        }

        #[test]
        fn no_valid_attendees() {
            let raw = timed(utc(2025, 2, 5, 10), utc(2025, 2, 5, 11))
                .with_attendee(RawAttendee::new("Conference Room B"));
            assert!(normalize_event(&raw, &Tz::UTC).attendees.is_empty());
        }
    }

    mod times {
        use super::*;

        #[test]
        fn timed_event_stays_timed() {
            let raw = timed(utc(2025, 2, 5, 10), utc(2025, 2, 5, 11));
            let event = normalize_event(&raw, &Tz::UTC);

            assert_eq!(event.start, EventTime::from_utc(utc(2025, 2, 5, 10)));
            assert_eq!(event.end, EventTime::from_utc(utc(2025, 2, 5, 11)));
            assert!(!event.is_all_day());
        }

        #[test]
        fn flagged_all_day_uses_local_dates() {
            // Midnight to midnight in Berlin, as Exchange reports it
            let raw = timed(utc(2025, 2, 4, 23), utc(2025, 2, 5, 23)).with_all_day(true);
            let event = normalize_event(&raw, &berlin());

            assert_eq!(event.start, EventTime::from_date(date(2025, 2, 5)));
            assert_eq!(event.end, EventTime::from_date(date(2025, 2, 6)));
        }

        #[test]
        fn multi_day_all_day() {
            let raw = timed(utc(2025, 2, 5, 0), utc(2025, 2, 8, 0)).with_all_day(true);
            let event = normalize_event(&raw, &Tz::UTC);

            assert_eq!(event.start, EventTime::from_date(date(2025, 2, 5)));
            assert_eq!(event.end, EventTime::from_date(date(2025, 2, 8)));
        }

        #[test]
        fn unflagged_midnight_to_midnight_is_all_day() {
            let raw = timed(utc(2025, 2, 5, 0), utc(2025, 2, 6, 0));
            let event = normalize_event(&raw, &Tz::UTC);
            assert!(event.is_all_day());
        }

        #[test]
        fn unflagged_across_dst_change_is_all_day() {
            // 30 March 2025 has 23 hours in Berlin
            let raw = timed(utc(2025, 3, 29, 23), utc(2025, 3, 30, 22));
            let event = normalize_event(&raw, &berlin());

            assert_eq!(event.start, EventTime::from_date(date(2025, 3, 30)));
            assert_eq!(event.end, EventTime::from_date(date(2025, 3, 31)));
        }

        #[test]
        fn unflagged_24h_not_at_midnight_stays_timed() {
            let raw = timed(utc(2025, 2, 5, 9), utc(2025, 2, 6, 9));
            assert!(!normalize_event(&raw, &Tz::UTC).is_all_day());
        }

        #[test]
        fn zero_length_at_midnight_stays_timed() {
            let raw = timed(utc(2025, 2, 5, 0), utc(2025, 2, 5, 0));
            assert!(!normalize_event(&raw, &Tz::UTC).is_all_day());
        }

        #[test]
        fn explicit_false_flag_wins() {
            let raw = timed(utc(2025, 2, 5, 0), utc(2025, 2, 6, 0)).with_all_day(false);
            assert!(!normalize_event(&raw, &Tz::UTC).is_all_day());
        }

        #[test]
        fn date_events_get_exclusive_end() {
            let raw = RawEvent::new(
                "d",
                RawEventTime::from_date(date(2025, 2, 5)),
                RawEventTime::from_date(date(2025, 2, 5)),
            );
            let event = normalize_event(&raw, &Tz::UTC);
            assert_eq!(event.end, EventTime::from_date(date(2025, 2, 6)));
        }
    }

    #[test]
    fn missing_fields_become_empty() {
        let raw = RawEvent::new(
            "x",
            RawEventTime::from_datetime(utc(2025, 2, 5, 10)),
            RawEventTime::from_datetime(utc(2025, 2, 5, 11)),
        );
        let event = normalize_event(&raw, &Tz::UTC);
        assert_eq!(event.subject, "");
        assert_eq!(event.location, "");
    }

    #[test]
    fn filters_cancelled_events() {
        let events = vec![
            timed(utc(2025, 2, 5, 10), utc(2025, 2, 5, 11)),
            timed(utc(2025, 2, 6, 10), utc(2025, 2, 6, 11)).with_cancelled(true),
        ];

        let normalized = normalize_events(&events, &Tz::UTC);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].start, EventTime::from_utc(utc(2025, 2, 5, 10)));
    }
}
