//! ICS generation.
//!
//! Output is written line by line rather than through a component builder so
//! that property values go out exactly as given: DTSTART/DTEND keep their
//! wall-clock fields and free text is not escaped.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{CalendarError, CalendarResult};
use crate::event::{EventDraft, Reminder};

pub const PRODID: &str = "-//caldav-mcp//EN";

const ICS_DATETIME: &str = "%Y%m%dT%H%M%S";

/// Generate .ics content for a new event.
///
/// `uid` is also used as the object's filename stem; `dtstamp` is the
/// creation time (UTC).
pub fn generate_ics(draft: &EventDraft, uid: &str, dtstamp: DateTime<Utc>) -> CalendarResult<String> {
    if draft.summary.trim().is_empty() {
        return Err(CalendarError::InvalidInput(
            "Event summary must not be empty".to_string(),
        ));
    }

    let tz = draft.timezone();
    let tzid = tz.name();
    let start = draft.start.naive_local();
    let end = draft.end.with_timezone(&tz).naive_local();

    let mut ics = IcsWriter::default();
    ics.line("BEGIN:VCALENDAR");
    ics.line("VERSION:2.0");
    ics.prop("PRODID", PRODID);
    ics.line("BEGIN:VEVENT");
    ics.prop("UID", uid);
    ics.prop("DTSTAMP", &dtstamp.format("%Y%m%dT%H%M%SZ").to_string());
    ics.prop("SUMMARY", &draft.summary);
    ics.prop(&format!("DTSTART;TZID={}", tzid), &start.format(ICS_DATETIME).to_string());
    ics.prop(&format!("DTEND;TZID={}", tzid), &end.format(ICS_DATETIME).to_string());

    if let Some(ref rrule) = draft.recurrence {
        ics.prop("RRULE", rrule.trim().trim_start_matches("RRULE:"));
    }

    if let Some(ref loc) = draft.location {
        ics.prop("LOCATION", loc);
    }

    if let Some(ref desc) = draft.description {
        ics.prop("DESCRIPTION", desc);
    }

    for reminder in &draft.reminders {
        add_alarm(&mut ics, reminder)?;
    }

    ics.line("END:VEVENT");
    ics.line("END:VCALENDAR");

    Ok(ics.finish())
}

#[derive(Default)]
struct IcsWriter {
    out: String,
}

impl IcsWriter {
    fn line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push_str("\r\n");
    }

    fn prop(&mut self, name: &str, value: &str) {
        self.out.push_str(name);
        self.out.push(':');
        self.line(value);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Write one VALARM block. DESCRIPTION is only emitted when supplied.
fn add_alarm(ics: &mut IcsWriter, reminder: &Reminder) -> CalendarResult<()> {
    let trigger = Trigger::parse(&reminder.trigger)?;

    ics.line("BEGIN:VALARM");
    ics.prop("ACTION", reminder.action.as_ics_str());
    match trigger {
        Trigger::Duration(value) => ics.prop("TRIGGER", &value),
        Trigger::Absolute(at) => ics.prop(
            "TRIGGER;VALUE=DATE-TIME",
            &at.format("%Y%m%dT%H%M%SZ").to_string(),
        ),
    }
    if let Some(ref desc) = reminder.description {
        ics.prop("DESCRIPTION", desc);
    }
    ics.line("END:VALARM");

    Ok(())
}

#[derive(Debug, PartialEq)]
enum Trigger {
    /// Relative to DTSTART, e.g. `-PT15M`
    Duration(String),
    /// Absolute UTC time
    Absolute(DateTime<Utc>),
}

impl Trigger {
    fn parse(value: &str) -> CalendarResult<Self> {
        let value = value.trim();
        let unsigned = value.trim_start_matches(['-', '+']);

        if unsigned.starts_with('P') {
            iso8601::duration(unsigned).map_err(|e| {
                CalendarError::InvalidInput(format!("Invalid reminder trigger '{}': {}", value, e))
            })?;
            return Ok(Trigger::Duration(value.to_string()));
        }

        let absolute = value
            .strip_suffix('Z')
            .and_then(|s| NaiveDateTime::parse_from_str(s, ICS_DATETIME).ok())
            .ok_or_else(|| {
                CalendarError::InvalidInput(format!(
                    "Invalid reminder trigger '{}'. Use a duration like -PT15M or a UTC time like 20250320T090000Z",
                    value
                ))
            })?;

        Ok(Trigger::Absolute(absolute.and_utc()))
    }
}
