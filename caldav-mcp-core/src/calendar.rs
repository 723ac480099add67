//! Calendar collections and the raw objects fetched from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One calendar collection on the CalDAV account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRef {
    /// Display name, used as the user-facing selector
    pub name: String,
    /// Absolute collection URL
    pub url: String,
    pub description: Option<String>,
    pub timezone: Option<String>,
    pub color: Option<String>,
    /// Supported component types (VEVENT, VTODO, ...)
    pub components: Vec<String>,
}

impl CalendarRef {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        CalendarRef {
            name: name.into(),
            url: url.into(),
            description: None,
            timezone: None,
            color: None,
            components: Vec::new(),
        }
    }
}

impl fmt::Display for CalendarRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A calendar resource as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCalendarObject {
    pub url: String,
    pub etag: Option<String>,
    pub data: String,
}

impl RawCalendarObject {
    pub fn new(url: impl Into<String>, data: impl Into<String>) -> Self {
        RawCalendarObject {
            url: url.into(),
            etag: None,
            data: data.into(),
        }
    }

    pub fn event_id(&self) -> String {
        event_id_from_url(&self.url)
    }
}

/// Derive the event identifier from an object URL.
///
/// "https://dav.example.com/cal/work/team-standup-1700000000000.ics" -> "team-standup-1700000000000"
pub fn event_id_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path);
    last.strip_suffix(".ics").unwrap_or(last).to_string()
}

/// Build a new event identifier from the summary and a timestamp.
///
/// The identifier doubles as the UID and as the `.ics` filename stem.
pub fn new_event_id(summary: &str, now: DateTime<Utc>) -> String {
    let base = slug::slugify(summary);
    let base = if base.is_empty() { "event".to_string() } else { base };
    format!("{}-{}", base, now.timestamp_millis())
}

/// Normalize a user-supplied event identifier to a `.ics` filename.
pub fn event_filename(event_id: &str) -> String {
    let id = event_id.trim();
    let id = id.strip_suffix(".ics").unwrap_or(id);
    format!("{}.ics", id)
}
