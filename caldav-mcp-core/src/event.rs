//! Event types.
//!
//! `ParsedEvent` is what the ICS decoder produces from a fetched calendar
//! object; `EventDraft` is what the encoder turns into a new `.ics` resource.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A DTSTART/DTEND/RECURRENCE-ID value, keeping the form it was written in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventTime {
    /// `VALUE=DATE` (all-day)
    Date(NaiveDate),
    /// `...Z`
    DateTimeUtc(DateTime<Utc>),
    /// No zone information at all
    DateTimeFloating(NaiveDateTime),
    /// `TZID=<zone>` wall-clock time
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    pub fn tzid(&self) -> Option<&str> {
        match self {
            EventTime::DateTimeZoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%dT%H:%M:%S"), tzid)
            }
        }
    }
}

/// VALARM action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmAction {
    Display,
    Audio,
    Email,
}

impl AlarmAction {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            AlarmAction::Display => "DISPLAY",
            AlarmAction::Audio => "AUDIO",
            AlarmAction::Email => "EMAIL",
        }
    }

    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DISPLAY" => Some(AlarmAction::Display),
            "AUDIO" => Some(AlarmAction::Audio),
            "EMAIL" => Some(AlarmAction::Email),
            _ => None,
        }
    }
}

/// A reminder attached to an event (one VALARM block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub action: AlarmAction,
    /// ICS duration (`-PT15M`) or absolute UTC time (`20250320T090000Z`)
    pub trigger: String,
    pub description: Option<String>,
}

/// Marks a VEVENT as one occurrence of a recurring series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceInstance {
    pub recurrence_id: EventTime,
    /// Identifier of the object holding the master event, if known
    pub master_event_id: Option<String>,
}

/// Event fields decoded from a VEVENT component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub rrule: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub recurrence: Option<RecurrenceInstance>,
    pub reminders: Vec<Reminder>,
}

impl ParsedEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Master of a recurring series (has an RRULE, is not itself an instance).
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some() && self.recurrence.is_none()
    }

    pub fn is_recurrence_instance(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// A new event to be written to a calendar.
///
/// `start` and `end` carry their zone; the encoder writes the wall-clock
/// fields of `start`'s zone and tags them with its IANA name.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub summary: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub recurrence: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub reminders: Vec<Reminder>,
}

impl EventDraft {
    pub fn new(summary: impl Into<String>, start: DateTime<Tz>, end: DateTime<Tz>) -> Self {
        EventDraft {
            summary: summary.into(),
            start,
            end,
            recurrence: None,
            location: None,
            description: None,
            reminders: Vec::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }
}
