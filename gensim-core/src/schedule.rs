//! Recurring schedules and the date masks that turn them into timestamps.
//!
//! A schedule stores an offset from the start of its period. The period start
//! (the *mask*) is Jan 1 for yearly schedules, the first of the month for
//! monthly ones and midnight of the current day for daily and weekly ones.
//! All dates are UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recurrence period of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleKind {
    /// Due in the months listed by the date indexes (1-12).
    Yearly,
    /// Due on the days of the month listed by the date indexes (1-31).
    Monthly,
    /// Due on the weekdays listed by the date indexes (0 = Monday).
    Weekly,
    /// Due every day.
    Daily,
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yearly => write!(f, "YEARLY"),
            Self::Monthly => write!(f, "MONTHLY"),
            Self::Weekly => write!(f, "WEEKLY"),
            Self::Daily => write!(f, "DAILY"),
        }
    }
}

/// When an event recurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Name of the scheduled event.
    pub event_name: String,
    /// Recurrence period.
    pub kind: ScheduleKind,
    /// Seconds after the period mask.
    pub offset: i64,
    /// For continuous events, how long the event stays available.
    pub duration: Option<i64>,
    /// Which days of the period the schedule is due on.
    pub date_indexes: Vec<u32>,
}

impl Schedule {
    /// A schedule with no date indexes and no duration.
    #[must_use]
    pub fn new(event_name: impl Into<String>, kind: ScheduleKind, offset: i64) -> Self {
        Self {
            event_name: event_name.into(),
            kind,
            offset,
            duration: None,
            date_indexes: Vec::new(),
        }
    }

    /// Make the event continuous for `duration` seconds.
    #[must_use]
    pub fn lasting(mut self, duration: i64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the date indexes.
    #[must_use]
    pub fn on(mut self, indexes: impl IntoIterator<Item = u32>) -> Self {
        self.date_indexes = indexes.into_iter().collect();
        self
    }

    /// Whether the schedule is due on `date`.
    #[must_use]
    pub fn is_due_on(&self, date: NaiveDate) -> bool {
        let index = match self.kind {
            ScheduleKind::Daily => return true,
            ScheduleKind::Weekly => date.weekday().num_days_from_monday(),
            ScheduleKind::Monthly => date.day(),
            ScheduleKind::Yearly => date.month(),
        };
        self.date_indexes.contains(&index)
    }

    /// Absolute timestamp of this schedule's occurrence on `date`.
    #[must_use]
    pub fn timestamp_on(&self, date: NaiveDate) -> i64 {
        mask(self.kind, date) + self.offset
    }
}

/// Unix timestamp of the start of the period containing `date`.
#[must_use]
pub fn mask(kind: ScheduleKind, date: NaiveDate) -> i64 {
    let start = match kind {
        ScheduleKind::Yearly => date.with_ordinal(1),
        ScheduleKind::Monthly => date.with_day(1),
        ScheduleKind::Weekly | ScheduleKind::Daily => Some(date),
    }
    .unwrap_or(date);
    midnight(start)
}

/// Unix timestamp of midnight UTC on `date`.
#[must_use]
pub fn midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// The UTC calendar day containing `timestamp`.
#[must_use]
pub fn day_of(timestamp: i64) -> NaiveDate {
    DateTime::from_timestamp(timestamp, 0)
        .map_or(NaiveDate::MIN, |dt| dt.date_naive())
}

/// Schedules among `schedules` that are due on `date`.
pub fn due_on<'a>(
    schedules: impl IntoIterator<Item = &'a Schedule>,
    date: NaiveDate,
) -> impl Iterator<Item = &'a Schedule> {
    schedules.into_iter().filter(move |s| s.is_due_on(date))
}

/// Seconds in `hours` hours and `minutes` minutes.
#[must_use]
pub const fn hm(hours: i64, minutes: i64) -> i64 {
    hours * 3600 + minutes * 60
}
