//! Date/time parsing for tool input and the listing window.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CalendarError, CalendarResult};

const LOCAL_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Closed window `[start, end]` used to select events.
///
/// `timezone` is used to place date-only and floating event times.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: Tz,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, timezone: Tz) -> CalendarResult<Self> {
        if end < start {
            return Err(CalendarError::InvalidInput(format!(
                "End of range ({}) is before its start ({})",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(DateRange {
            start,
            end,
            timezone,
        })
    }

    /// Parse tool arguments into a range.
    /// - `start`/`end`: RFC 3339 instant, local `YYYY-MM-DDTHH:MM:SS`, or `YYYY-MM-DD`
    /// - a bare date covers the whole day (start of day / end of day)
    pub fn from_args(start: &str, end: &str, timezone: Tz) -> CalendarResult<Self> {
        let start_dt = parse_range_bound(start, timezone, Bound::Start)?;
        let end_dt = parse_range_bound(end, timezone, Bound::End)?;
        Self::new(start_dt, end_dt, timezone)
    }

    /// Closed-interval overlap: touching endpoints count.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }

    /// CalDAV time-range format (`YYYYMMDDTHHMMSSZ`)
    pub fn caldav_start(&self) -> String {
        format_caldav_datetime(&self.start)
    }

    pub fn caldav_end(&self) -> String {
        format_caldav_datetime(&self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Start,
    End,
}

pub fn format_caldav_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Look up an IANA zone name.
pub fn parse_timezone(name: &str) -> CalendarResult<Tz> {
    name.trim().parse::<Tz>().map_err(|_| {
        CalendarError::InvalidInput(format!(
            "Unknown timezone '{}'. Expected an IANA name such as Europe/Berlin",
            name
        ))
    })
}

/// Parse a local `YYYY-MM-DDTHH:MM:SS` time in `tz`, or an RFC 3339 instant
/// converted to `tz`.
pub fn parse_datetime_in(value: &str, tz: Tz) -> CalendarResult<DateTime<Tz>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&tz));
    }

    let naive = parse_naive_local(value).ok_or_else(|| {
        CalendarError::InvalidInput(format!(
            "Invalid date-time '{}'. Expected YYYY-MM-DDTHH:MM:SS or RFC 3339",
            value
        ))
    })?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(CalendarError::InvalidInput(format!(
            "'{}' does not exist in {} (skipped by a DST transition)",
            value,
            tz.name()
        ))),
    }
}

fn parse_naive_local(value: &str) -> Option<NaiveDateTime> {
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn parse_range_bound(value: &str, tz: Tz, bound: Bound) -> CalendarResult<DateTime<Utc>> {
    let trimmed = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let instant = match bound {
            Bound::Start => start_of_day(date, tz),
            Bound::End => start_of_day(date + Duration::days(1), tz) - Duration::seconds(1),
        };
        return Ok(instant);
    }

    parse_datetime_in(trimmed, tz).map(|dt| dt.with_timezone(&Utc))
}

/// Resolve a wall-clock time in `tz` to an instant.
///
/// Ambiguous times take the earlier instant; times inside a DST gap are
/// moved forward by the gap (one hour in practice).
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

/// Midnight at the start of `date` in `tz`.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    resolve_local(date.and_time(chrono::NaiveTime::MIN), tz)
}
