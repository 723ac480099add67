//! RRULE expansion for recurring events.
//!
//! Used by the filter to decide whether a recurring master has an occurrence
//! inside the listing window.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::date_range::{format_caldav_datetime, start_of_day};
use crate::error::{CalendarError, CalendarResult};
use crate::event::EventTime;

/// Upper bound on generated occurrences per event.
const MAX_OCCURRENCES: u16 = 366;

/// Build an iCalendar-format RRULE string for the rrule crate parser.
///
/// `zone` is the zone the start's wall-clock fields are in; UTC starts keep
/// their `Z` form.
fn build_rrule_string(start: &EventTime, rrule: &str, zone: Tz) -> String {
    let dtstart = match start {
        EventTime::DateTimeUtc(dt) => format!("DTSTART:{}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::Date(d) => format!("DTSTART;TZID={}:{}T000000", zone.name(), d.format("%Y%m%d")),
        EventTime::DateTimeFloating(datetime) | EventTime::DateTimeZoned { datetime, .. } => {
            format!(
                "DTSTART;TZID={}:{}",
                zone.name(),
                datetime.format("%Y%m%dT%H%M%S")
            )
        }
    };

    let rule = rrule.trim().trim_start_matches("RRULE:");
    let rule = match start {
        EventTime::Date(_) => until_as_utc(rule, zone),
        _ => rule.to_string(),
    };
    format!("{}\nRRULE:{}", dtstart, rule)
}

/// All-day series end with a date-only `UNTIL`, which can't be combined
/// with a TZID start. Rewrite it as the last second of that day in `zone`.
fn until_as_utc(rule: &str, zone: Tz) -> String {
    rule.split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return part.to_string();
            };
            if !key.trim().eq_ignore_ascii_case("UNTIL") {
                return part.to_string();
            }
            match NaiveDate::parse_from_str(value.trim(), "%Y%m%d") {
                Ok(date) if value.trim().len() == 8 => {
                    let until = start_of_day(date + Duration::days(1), zone) - Duration::seconds(1);
                    format!("UNTIL={}", format_caldav_datetime(&until))
                }
                _ => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Occurrence start times of a recurring event whose `[occ, occ + duration]`
/// span could touch `[range_start, range_end]`.
pub fn occurrences_between(
    start: &EventTime,
    rrule: &str,
    zone: Tz,
    duration: Duration,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> CalendarResult<Vec<DateTime<Utc>>> {
    let rrule_str = build_rrule_string(start, rrule, zone);

    let rrule_set: RRuleSet = rrule_str
        .parse()
        .map_err(|e| CalendarError::IcsParse(format!("Failed to parse RRULE '{}': {}", rrule, e)))?;

    // after/before are exclusive; widen by a second on each side and by the
    // event length at the front so an occurrence that started earlier but is
    // still running counts.
    let tz: rrule::Tz = Utc.into();
    let after = (range_start - duration - Duration::seconds(1)).with_timezone(&tz);
    let before = (range_end + Duration::seconds(1)).with_timezone(&tz);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);

    Ok(result
        .dates
        .iter()
        .map(|dt| dt.with_timezone(&Utc))
        .collect())
}
