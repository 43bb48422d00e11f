//! Date parsing for tool arguments and resource URIs
//!
//! Accepts the relative keywords `today`, `tomorrow` and `yesterday`, plain
//! `YYYY-MM-DD` dates, RFC 3339 timestamps and naive timestamps (read as UTC).

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::{Result, ValidationError};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// A parsed date argument: a whole day or a precise instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateInput {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

impl DateInput {
    /// Parse user input relative to `today`
    pub fn parse(input: &str, today: NaiveDate) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty date"));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "today" => return Ok(Self::Day(today)),
            "tomorrow" => return Ok(Self::Day(today + Duration::days(1))),
            "yesterday" => return Ok(Self::Day(today - Duration::days(1))),
            _ => {}
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::Day(date));
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::Instant(dt.with_timezone(&Utc)));
        }

        NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(|naive| Self::Instant(Utc.from_utc_datetime(&naive)))
            .ok_or_else(|| {
                invalid(
                    input,
                    "expected today, tomorrow, yesterday, YYYY-MM-DD or an ISO-8601 timestamp",
                )
            })
    }

    /// Earliest instant covered: midnight UTC for a day
    pub fn start_of(&self) -> DateTime<Utc> {
        match self {
            Self::Day(date) => day_bounds(*date).0,
            Self::Instant(t) => *t,
        }
    }

    /// Exclusive upper bound: the following midnight for a day
    pub fn end_of(&self) -> DateTime<Utc> {
        match self {
            Self::Day(date) => day_bounds(*date).1,
            Self::Instant(t) => *t,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Day(date) => *date,
            Self::Instant(t) => t.date_naive(),
        }
    }
}

/// Today's date in UTC
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Resolve a day expression to a calendar date
pub fn parse_day(input: &str, today: NaiveDate) -> Result<NaiveDate> {
    DateInput::parse(input, today).map(|d| d.date())
}

/// Resolve a timestamp expression; bare days resolve to midnight UTC
pub fn parse_datetime(input: &str, today: NaiveDate) -> Result<DateTime<Utc>> {
    DateInput::parse(input, today).map(|d| d.start_of())
}

/// `[midnight, next midnight)` in UTC
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

fn invalid(input: &str, message: &str) -> crate::error::CalendarMcpError {
    ValidationError::InvalidDate {
        input: input.to_string(),
        message: message.to_string(),
    }
    .into()
}
