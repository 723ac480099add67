//! Selecting fetched events that fall inside a listing window.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::calendar::RawCalendarObject;
use crate::date_range::{DateRange, resolve_local, start_of_day};
use crate::event::{EventTime, ParsedEvent};
use crate::ics::{ParseFailure, parse_object};
use crate::recurrence::occurrences_between;

/// One entry of an event listing, in server order.
#[derive(Debug, Clone, PartialEq)]
pub enum ListedEntry {
    Event(ParsedEvent),
    /// Placeholder for an event that could not be decoded
    Unparsable(ParseFailure),
}

/// Decode `objects` and keep the events overlapping `range`.
///
/// Order follows `objects`. Events that fail to decode are kept as
/// `Unparsable` entries at their position instead of aborting the listing.
pub fn filter_objects(objects: &[RawCalendarObject], range: &DateRange) -> Vec<ListedEntry> {
    let mut entries = Vec::new();

    for object in objects {
        for result in parse_object(object) {
            match result {
                Ok(event) => {
                    if event_in_range(&event, range) {
                        entries.push(ListedEntry::Event(event));
                    }
                }
                Err(failure) => {
                    debug!(url = %object.url, reason = %failure.reason, "Failed to parse calendar object");
                    entries.push(ListedEntry::Unparsable(failure));
                }
            }
        }
    }

    entries
}

/// Closed-interval overlap test; recurring masters match when any occurrence
/// overlaps.
pub fn event_in_range(event: &ParsedEvent, range: &DateRange) -> bool {
    let (start, end) = event_bounds(event, range.timezone);

    if range.overlaps(start, end) {
        return true;
    }

    let Some(rrule) = event.rrule.as_deref().filter(|_| event.is_recurring()) else {
        return false;
    };

    let zone = zone_for(&event.start, range.timezone);
    match occurrences_between(&event.start, rrule, zone, end - start, range.start, range.end) {
        Ok(occurrences) => !occurrences.is_empty(),
        Err(e) => {
            warn!(summary = %event.summary, error = %e, "Could not expand recurring event");
            false
        }
    }
}

/// Start and end of an event as UTC instants.
///
/// An all-day end is exclusive in iCalendar; the event covers up to the end
/// of the day before it, and never less than its start day.
pub fn event_bounds(event: &ParsedEvent, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = to_utc(&event.start, tz);

    let end = match (&event.start, &event.end) {
        (EventTime::Date(start_date), EventTime::Date(end_date)) => {
            let last_day = (*end_date - Duration::days(1)).max(*start_date);
            start_of_day(last_day + Duration::days(1), tz) - Duration::seconds(1)
        }
        (_, other) => to_utc(other, tz),
    };

    (start, end.max(start))
}

/// Resolve an event time to an instant. Date-only and floating values are
/// placed in `tz`.
pub fn to_utc(time: &EventTime, tz: Tz) -> DateTime<Utc> {
    match time {
        EventTime::Date(d) => start_of_day(*d, tz),
        EventTime::DateTimeUtc(dt) => *dt,
        EventTime::DateTimeFloating(dt) => resolve_local(*dt, tz),
        EventTime::DateTimeZoned { datetime, .. } => resolve_local(*datetime, zone_for(time, tz)),
    }
}

/// The zone an event time's wall clock is in.
fn zone_for(time: &EventTime, fallback: Tz) -> Tz {
    match time.tzid() {
        Some(tzid) => tzid.parse::<Tz>().unwrap_or_else(|_| {
            debug!(tzid, fallback = %fallback.name(), "Unknown TZID, using listing timezone");
            fallback
        }),
        None => fallback,
    }
}
