//! Event times and the sync window.

use std::cmp::Ordering;

use chrono::offset::LocalResult;
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Start or end of an event: an instant, or a calendar date for all-day
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    DateTime(DateTime<Utc>),
    /// Floating date. An all-day event's end is the day after its last day.
    AllDay(NaiveDate),
}

impl EventTime {
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// The instant this time denotes in `tz`. Dates start at local midnight.
    pub fn to_instant_in<T: TimeZone>(&self, tz: &T) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => local_midnight(*date, tz),
        }
    }
}

/// Orders dates as UTC midnight so mixed lists sort deterministically
/// without a timezone.
impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_instant_in(&Utc).cmp(&other.to_instant_in(&Utc))
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// First instant of `date` in `tz`.
///
/// If a DST gap swallows midnight, the day starts an hour later.
pub fn local_midnight<T: TimeZone>(date: NaiveDate, tz: &T) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    let resolved = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest(),
    };
    resolved.map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc))
}

/// Half-open UTC range `[start, end)` covered by a pass.
///
/// An event belongs to the window when its start does. All-day starts are
/// placed at local midnight in `timezone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Tz,
}

impl SyncWindow {
    /// # Panics
    ///
    /// If `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, timezone: Tz) -> Self {
        assert!(start <= end, "SyncWindow start must be <= end");
        Self { start, end, timezone }
    }

    /// Whole local days from `days_past` days before today through
    /// `days_future` days after it, today being the date of `now` in
    /// `timezone`.
    ///
    /// Returns `None` when either bound falls outside the supported date
    /// range.
    pub fn around(
        now: DateTime<Utc>,
        timezone: Tz,
        days_past: u32,
        days_future: u32,
    ) -> Option<Self> {
        let today = now.with_timezone(&timezone).date_naive();
        let first_day = today.checked_sub_days(Days::new(days_past.into()))?;
        let end_day = today.checked_add_days(Days::new(u64::from(days_future) + 1))?;
        Some(Self::new(
            local_midnight(first_day, &timezone),
            local_midnight(end_day, &timezone),
            timezone,
        ))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether an event starting at `start` is in the window.
    pub fn contains(&self, start: &EventTime) -> bool {
        let at = start.to_instant_in(&self.timezone);
        (self.start..self.end).contains(&at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tz(name: &str) -> Tz {
        name.parse().unwrap()
    }

    #[test]
    fn dates_resolve_to_local_midnight() {
        let holiday = EventTime::from_date(day(2025, 2, 5));
        assert_eq!(holiday.to_instant_in(&Utc), utc(2025, 2, 5, 0, 0));
        assert_eq!(holiday.to_instant_in(&tz("Europe/Berlin")), utc(2025, 2, 4, 23, 0));
        assert_eq!(holiday.to_instant_in(&tz("America/New_York")), utc(2025, 2, 5, 5, 0));

        let meeting = utc(2025, 2, 5, 10, 30);
        assert_eq!(EventTime::from_utc(meeting).to_instant_in(&tz("Asia/Tokyo")), meeting);
    }

    #[test]
    fn midnight_in_dst_gap() {
        // Santiago skipped from 00:00 to 01:00 on 2024-09-08.
        let santiago = tz("America/Santiago");
        assert_eq!(local_midnight(day(2024, 9, 8), &santiago), utc(2024, 9, 8, 4, 0));
    }

    #[test]
    fn mixed_times_sort_by_instant() {
        let mut times = vec![
            EventTime::from_utc(utc(2025, 2, 5, 11, 0)),
            EventTime::from_date(day(2025, 2, 5)),
            EventTime::from_utc(utc(2025, 2, 4, 23, 0)),
        ];
        times.sort();
        assert_eq!(
            times,
            [
                EventTime::from_utc(utc(2025, 2, 4, 23, 0)),
                EventTime::from_date(day(2025, 2, 5)),
                EventTime::from_utc(utc(2025, 2, 5, 11, 0)),
            ]
        );
    }

    #[test]
    fn window_spans_whole_days() {
        let window = SyncWindow::around(utc(2024, 1, 10, 15, 30), Tz::UTC, 7, 14).unwrap();
        assert_eq!(window.start, utc(2024, 1, 3, 0, 0));
        assert_eq!(window.end, utc(2024, 1, 25, 0, 0));
        assert_eq!(window.duration(), Duration::days(22));
    }

    #[test]
    fn window_today_is_local() {
        // 23:30 UTC on the 9th is already the 10th in Berlin.
        let window = SyncWindow::around(utc(2024, 1, 9, 23, 30), tz("Europe/Berlin"), 0, 0).unwrap();
        assert_eq!(window.start, utc(2024, 1, 9, 23, 0));
        assert_eq!(window.end, utc(2024, 1, 10, 23, 0));
    }

    #[test]
    fn window_across_dst_is_not_24h_multiple() {
        let window = SyncWindow::around(utc(2024, 3, 31, 12, 0), tz("Europe/Berlin"), 0, 0).unwrap();
        assert_eq!(window.duration(), Duration::hours(23));
    }

    #[test]
    fn start_inclusive_end_exclusive() {
        let window = SyncWindow::new(utc(2024, 1, 3, 0, 0), utc(2024, 1, 25, 0, 0), Tz::UTC);
        let at = |dt| window.contains(&EventTime::from_utc(dt));

        assert!(at(utc(2024, 1, 3, 0, 0)));
        assert!(at(utc(2024, 1, 24, 23, 59)));
        assert!(!at(utc(2024, 1, 25, 0, 0)));
        assert!(!at(utc(2024, 1, 2, 23, 59)));

        assert!(window.contains(&EventTime::from_date(day(2024, 1, 3))));
        assert!(window.contains(&EventTime::from_date(day(2024, 1, 24))));
        assert!(!window.contains(&EventTime::from_date(day(2024, 1, 25))));
    }

    #[test]
    fn all_day_membership_follows_window_timezone() {
        let berlin = tz("Europe/Berlin");
        let window = SyncWindow::around(utc(2024, 1, 10, 12, 0), berlin, 0, 0).unwrap();
        assert!(window.contains(&EventTime::from_date(day(2024, 1, 10))));
        assert!(!window.contains(&EventTime::from_date(day(2024, 1, 11))));
        // 23:30 UTC on the 10th is the 11th in Berlin.
        assert!(!window.contains(&EventTime::from_utc(utc(2024, 1, 10, 23, 30))));
    }

    #[test]
    fn oversized_window_is_none() {
        let now = utc(2024, 1, 10, 12, 0);
        assert!(SyncWindow::around(now, Tz::UTC, 200_000_000, 1).is_none());
        assert!(SyncWindow::around(now, Tz::UTC, 1, u32::MAX).is_none());
        assert!(SyncWindow::around(now, Tz::UTC, 36_500, 36_500).is_some());
    }

    #[test]
    #[should_panic(expected = "start must be <= end")]
    fn reversed_window_panics() {
        SyncWindow::new(utc(2024, 1, 2, 0, 0), utc(2024, 1, 1, 0, 0), Tz::UTC);
    }
}
