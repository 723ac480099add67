//! MCP tool request types.

use caldav_mcp_core::date_range::{parse_datetime_in, parse_timezone};
use caldav_mcp_core::error::CalendarResult;
use caldav_mcp_core::event::{AlarmAction, EventDraft, Reminder};
use rmcp::schemars;
use serde::Deserialize;

/// Create an event in a calendar.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[schemars(description = "Event title")]
    pub summary: String,
    #[schemars(description = "Start as local time YYYY-MM-DDTHH:MM:SS in `timezone`, or an RFC 3339 instant")]
    pub start: String,
    #[schemars(description = "End as local time YYYY-MM-DDTHH:MM:SS in `timezone`, or an RFC 3339 instant")]
    pub end: String,
    #[schemars(description = "IANA timezone name, e.g. Europe/Berlin")]
    pub timezone: String,
    #[schemars(description = "Recurrence rule, e.g. FREQ=WEEKLY;BYDAY=MO")]
    pub recurrence: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    #[schemars(description = "Calendar display name (defaults to the first calendar)")]
    pub calendar_name: Option<String>,
    #[serde(default)]
    #[schemars(description = "Reminders to attach to the event")]
    pub reminders: Vec<ReminderInput>,
}

/// A reminder on a new event.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ReminderInput {
    pub action: ReminderAction,
    #[schemars(description = "Duration relative to start (e.g. -PT15M) or UTC time (e.g. 20250320T090000Z)")]
    pub trigger: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "UPPERCASE")]
pub enum ReminderAction {
    Display,
    Audio,
    Email,
}

impl From<ReminderAction> for AlarmAction {
    fn from(action: ReminderAction) -> Self {
        match action {
            ReminderAction::Display => AlarmAction::Display,
            ReminderAction::Audio => AlarmAction::Audio,
            ReminderAction::Email => AlarmAction::Email,
        }
    }
}

impl CreateEventRequest {
    /// Resolve times in the requested zone and build the event to write.
    pub fn to_draft(&self) -> CalendarResult<EventDraft> {
        let tz = parse_timezone(&self.timezone)?;
        let start = parse_datetime_in(&self.start, tz)?;
        let end = parse_datetime_in(&self.end, tz)?;

        let mut draft = EventDraft::new(self.summary.clone(), start, end);
        draft.recurrence = non_empty(&self.recurrence);
        draft.location = non_empty(&self.location);
        draft.description = non_empty(&self.description);
        draft.reminders = self
            .reminders
            .iter()
            .map(|r| Reminder {
                action: r.action.into(),
                trigger: r.trigger.clone(),
                description: non_empty(&r.description),
            })
            .collect();

        Ok(draft)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

/// List events between two times.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "camelCase")]
pub struct ListEventsRequest {
    #[schemars(description = "Range start: YYYY-MM-DD, local YYYY-MM-DDTHH:MM:SS, or RFC 3339")]
    pub start: String,
    #[schemars(description = "Range end: YYYY-MM-DD (whole day), local YYYY-MM-DDTHH:MM:SS, or RFC 3339")]
    pub end: String,
    #[schemars(description = "IANA timezone for local times and all-day events (defaults to the server's)")]
    pub timezone: Option<String>,
    #[schemars(description = "Calendar display name (defaults to the first calendar)")]
    pub calendar_name: Option<String>,
}

/// Fetch the master event of a recurring series.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "camelCase")]
pub struct GetMasterEventRequest {
    #[schemars(description = "Event ID (the object's filename without .ics), e.g. from a Master Event ID line")]
    pub event_id: String,
    #[schemars(description = "Calendar display name (defaults to the first calendar)")]
    pub calendar_name: Option<String>,
}
