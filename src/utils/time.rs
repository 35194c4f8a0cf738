use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Source of "now" for anything that compares against expiry or slot times.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// A wall-clock slot picked in the scheduler's UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timezone: Tz,
}

impl TimeSlot {
    pub fn new(date: NaiveDate, time: NaiveTime, timezone: Tz) -> Self {
        Self {
            date,
            time,
            timezone,
        }
    }

    /// Resolve to a UTC instant. Times skipped by a DST jump are rejected;
    /// repeated times resolve to the earlier instant.
    pub fn start_utc(&self) -> Result<DateTime<Utc>> {
        let local = NaiveDateTime::new(self.date, self.time);
        match self.timezone.from_local_datetime(&local) {
            LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => Err(Error::BadRequest(format!(
                "{} {} does not exist in {}",
                self.date,
                self.time.format("%H:%M"),
                self.timezone
            ))),
        }
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::BadRequest(format!("Unknown timezone '{}'", name)))
}

/// Human-readable rendering used in emails, e.g. "Saturday, March 1, 2025 at 10:00 AM EST".
pub fn format_in_zone(instant: DateTime<Utc>, timezone: &str) -> String {
    match timezone.parse::<Tz>() {
        Ok(tz) => instant
            .with_timezone(&tz)
            .format("%A, %B %-d, %Y at %-I:%M %p %Z")
            .to_string(),
        Err(_) => instant.format("%A, %B %-d, %Y at %-I:%M %p UTC").to_string(),
    }
}
