//! Plain-text rendering of calendars and events for tool output.

use crate::calendar::CalendarRef;
use crate::event::ParsedEvent;
use crate::filter::ListedEntry;

const BLOCK_SEPARATOR: &str = "\n\n";

pub fn format_calendar(calendar: &CalendarRef) -> String {
    let mut lines = vec![
        format!("Name: {}", calendar.name),
        format!("URL: {}", calendar.url),
    ];

    if let Some(ref desc) = calendar.description {
        lines.push(format!("Description: {}", desc));
    }
    if let Some(ref tz) = calendar.timezone {
        lines.push(format!("Timezone: {}", tz));
    }
    if let Some(ref color) = calendar.color {
        lines.push(format!("Color: {}", color));
    }
    if !calendar.components.is_empty() {
        lines.push(format!("Components: {}", calendar.components.join(", ")));
    }

    lines.join("\n")
}

pub fn format_calendars(calendars: &[CalendarRef]) -> String {
    calendars
        .iter()
        .map(format_calendar)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// Render one event. The first line is the summary followed by
/// `[All Day]`, `[Recurring]` or `[Recurrence Instance]` tags.
pub fn format_event(event: &ParsedEvent) -> String {
    let mut title = event.summary.clone();
    if event.is_all_day() {
        title.push_str(" [All Day]");
    }
    if event.is_recurring() {
        title.push_str(" [Recurring]");
    }
    if event.is_recurrence_instance() {
        title.push_str(" [Recurrence Instance]");
    }

    let mut lines = vec![
        title,
        format!("Start: {}", event.start),
        format!("End: {}", event.end),
    ];

    if let Some(ref loc) = event.location {
        lines.push(format!("Location: {}", loc));
    }
    if let Some(ref desc) = event.description {
        lines.push(format!("Description: {}", desc));
    }
    if let Some(ref rrule) = event.rrule {
        lines.push(format!("Recurrence: {}", rrule));
    }
    if let Some(ref instance) = event.recurrence {
        lines.push(format!("Recurrence ID: {}", instance.recurrence_id));
        if let Some(ref master) = instance.master_event_id {
            lines.push(format!("Master Event ID: {}", master));
        }
    }
    if !event.reminders.is_empty() {
        let reminders: Vec<String> = event
            .reminders
            .iter()
            .map(|r| match r.description {
                Some(ref desc) => format!("{} {} ({})", r.action.as_ics_str(), r.trigger, desc),
                None => format!("{} {}", r.action.as_ics_str(), r.trigger),
            })
            .collect();
        lines.push(format!("Reminders: {}", reminders.join("; ")));
    }
    if let Some(ref uid) = event.uid {
        lines.push(format!("UID: {}", uid));
    }

    lines.join("\n")
}

pub fn format_entry(entry: &ListedEntry) -> String {
    match entry {
        ListedEntry::Event(event) => format_event(event),
        ListedEntry::Unparsable(failure) => failure.to_string(),
    }
}

pub fn format_entries(entries: &[ListedEntry]) -> String {
    entries
        .iter()
        .map(format_entry)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
