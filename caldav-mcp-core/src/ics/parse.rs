//! ICS parsing using the icalendar crate's parser.
//!
//! The parser unfolds continuation lines and tracks BEGIN/END nesting; this
//! module only picks the VEVENT properties we show and their VALARMs.

use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};

use super::ParseFailure;
use crate::calendar::RawCalendarObject;
use crate::event::{AlarmAction, EventTime, ParsedEvent, RecurrenceInstance, Reminder};

/// Parse the first VEVENT of an ICS document.
pub fn parse_event(content: &str) -> Result<ParsedEvent, ParseFailure> {
    parse_events(content)?
        .into_iter()
        .next()
        .unwrap_or_else(|| Err(ParseFailure::new("no VEVENT component")))
}

/// Parse the master VEVENT (the one without RECURRENCE-ID), falling back to
/// the first one when the object only holds instances.
pub fn parse_master_event(content: &str) -> Result<ParsedEvent, ParseFailure> {
    let events = parse_events(content)?;
    let mut first_err = None;
    let mut first_ok = None;

    for result in events {
        match result {
            Ok(event) if event.recurrence.is_none() => return Ok(event),
            Ok(event) => {
                first_ok.get_or_insert(event);
            }
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    first_ok
        .map(Ok)
        .or_else(|| first_err.map(Err))
        .unwrap_or_else(|| Err(ParseFailure::new("no VEVENT component")))
}

/// Parse every VEVENT in an ICS document, in document order.
///
/// The outer error means the document itself is unreadable; the inner
/// results are per-event, so one bad VEVENT doesn't hide its siblings.
pub fn parse_events(content: &str) -> Result<Vec<Result<ParsedEvent, ParseFailure>>, ParseFailure> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| ParseFailure::new(format!("malformed iCalendar data ({})", e)))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    if vevents.is_empty() {
        return Err(ParseFailure::new("no VEVENT component"));
    }

    Ok(vevents.into_iter().map(parse_vevent).collect())
}

/// Parse all events of a fetched object, tagging recurrence instances with
/// the object's event identifier.
pub fn parse_object(object: &RawCalendarObject) -> Vec<Result<ParsedEvent, ParseFailure>> {
    match parse_events(&object.data) {
        Ok(results) => results
            .into_iter()
            .map(|result| {
                result.map(|mut event| {
                    if let Some(ref mut instance) = event.recurrence {
                        instance.master_event_id = Some(object.event_id());
                    }
                    event
                })
            })
            .collect(),
        Err(e) => vec![Err(e)],
    }
}

fn collect_vevents<'a, 'c>(components: &'c [Component<'a>], out: &mut Vec<&'c Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component) -> Result<ParsedEvent, ParseFailure> {
    // Required fields
    let summary = text_prop(vevent, "SUMMARY").ok_or_else(|| ParseFailure::new("missing SUMMARY"))?;
    let start = required_time(vevent, "DTSTART")?;
    let end = required_time(vevent, "DTEND")?;

    let uid = text_prop(vevent, "UID");
    let rrule = text_prop(vevent, "RRULE");
    let location = text_prop(vevent, "LOCATION");
    let description = text_prop(vevent, "DESCRIPTION");

    // RECURRENCE-ID marks an instance; the master id comes from the object URL
    let recurrence = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(parse_event_time)
        .map(|recurrence_id| RecurrenceInstance {
            recurrence_id,
            master_event_id: None,
        });

    // Reminders from VALARM components
    let reminders = vevent
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(parse_alarm)
        .collect();

    Ok(ParsedEvent {
        uid,
        summary,
        start,
        end,
        rrule,
        location,
        description,
        recurrence,
        reminders,
    })
}

fn text_prop(component: &Component, name: &str) -> Option<String> {
    component.find_prop(name).map(|p| p.val.to_string())
}

fn required_time(vevent: &Component, name: &str) -> Result<EventTime, ParseFailure> {
    let prop = vevent
        .find_prop(name)
        .ok_or_else(|| ParseFailure::new(format!("missing {}", name)))?;
    parse_event_time(prop)
        .ok_or_else(|| ParseFailure::new(format!("invalid {} value '{}'", name, prop.val.as_ref())))
}

fn param_value(prop: &Property, key: &str) -> Option<String> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
}

/// Parse a date or date-time property.
///
/// Handles:
/// - All-day: `DTSTART;VALUE=DATE:20240101` (or a bare 8-digit value)
/// - UTC: `DTSTART:20240101T100000Z`
/// - Zoned: `DTSTART;TZID=America/New_York:20240101T100000`
/// - Floating: `DTSTART:20240101T100000`
fn parse_event_time(prop: &Property) -> Option<EventTime> {
    let time = match DatePerhapsTime::try_from(prop).ok()? {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => EventTime::DateTimeUtc(dt),
            CalendarDateTime::Floating(naive) => EventTime::DateTimeFloating(naive),
            CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::DateTimeZoned {
                datetime: date_time,
                tzid: tzid.trim_matches('"').to_string(),
            },
        },
    };

    // VALUE=DATE wins over a value written with a time part
    let is_date = param_value(prop, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
    Some(match time {
        EventTime::DateTimeUtc(dt) if is_date => EventTime::Date(dt.date_naive()),
        EventTime::DateTimeFloating(dt) | EventTime::DateTimeZoned { datetime: dt, .. }
            if is_date =>
        {
            EventTime::Date(dt.date())
        }
        time => time,
    })
}

fn parse_alarm(alarm: &Component) -> Option<Reminder> {
    let trigger = alarm.find_prop("TRIGGER")?.val.as_ref().trim().to_string();
    let action = alarm
        .find_prop("ACTION")
        .and_then(|p| AlarmAction::from_ics_str(p.val.as_ref()))
        .unwrap_or(AlarmAction::Display);
    let description = text_prop(alarm, "DESCRIPTION");

    Some(Reminder {
        action,
        trigger,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDraft;
    use crate::ics::{PARSE_FAILURE_MARKER, generate_ics};
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;
    use indoc::indoc;

    const TIMED: &str = indoc! {"
        BEGIN:VCALENDAR
        VERSION:2.0
        PRODID:TEST
        BEGIN:VEVENT
        UID:abc-123
        SUMMARY:Planning
        DTSTART;TZID=Europe/Berlin:20240320T100000
        DTEND;TZID=Europe/Berlin:20240320T110000
        LOCATION:Room 4
        DESCRIPTION:Quarterly planning
        END:VEVENT
        END:VCALENDAR
    "};

    #[test]
    fn test_parse_zoned_event() {
        let event = parse_event(TIMED).expect("Should parse");

        assert_eq!(event.summary, "Planning");
        assert_eq!(event.uid.as_deref(), Some("abc-123"));
        assert_eq!(event.start.to_string(), "2024-03-20T10:00:00 (Europe/Berlin)");
        assert_eq!(event.end.tzid(), Some("Europe/Berlin"));
        assert_eq!(event.location.as_deref(), Some("Room 4"));
        assert_eq!(event.description.as_deref(), Some("Quarterly planning"));
        assert!(!event.is_all_day());
        assert!(!event.is_recurring());
    }

    #[test]
    fn test_parse_utc_and_all_day_forms() {
        let utc = indoc! {"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Call
            DTSTART:20240320T100000Z
            DTEND:20240320T103000Z
            END:VEVENT
            END:VCALENDAR
        "};
        let event = parse_event(utc).expect("Should parse");
        assert_eq!(event.start.to_string(), "2024-03-20T10:00:00Z");

        let all_day = indoc! {"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Holiday
            DTSTART;VALUE=DATE:20240101
            DTEND;VALUE=DATE:20240103
            END:VEVENT
            END:VCALENDAR
        "};
        let event = parse_event(all_day).expect("Should parse");
        assert!(event.is_all_day());
        assert_eq!(event.start.to_string(), "2024-01-01");
        assert_eq!(event.end.to_string(), "2024-01-03");
    }

    #[test]
    fn test_parse_bare_date_and_quoted_tzid() {
        let ics = indoc! {r#"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Offsite
            DTSTART:20240601
            DTEND;TZID="America/New_York":20240602T170000
            END:VEVENT
            END:VCALENDAR
        "#};
        let event = parse_event(ics).expect("Should parse");
        assert_eq!(event.start.to_string(), "2024-06-01");
        assert_eq!(event.end.tzid(), Some("America/New_York"));
    }

    #[test]
    fn test_missing_required_fields_fail() {
        for missing in ["SUMMARY", "DTSTART", "DTEND"] {
            let ics: String = TIMED
                .lines()
                .filter(|l| !l.starts_with(missing))
                .map(|l| format!("{}\r\n", l))
                .collect();

            let err = parse_event(&ics).expect_err("Should fail without required field");
            assert!(
                err.to_string().starts_with(PARSE_FAILURE_MARKER),
                "Unexpected failure text: {}",
                err
            );
            assert!(err.reason.contains(missing), "Reason should name {}: {}", missing, err.reason);
        }
    }

    #[test]
    fn test_invalid_date_value_fails() {
        let ics = TIMED.replace("20240320T110000", "tomorrow");
        assert!(parse_event(&ics).is_err());
    }

    #[test]
    fn test_garbage_is_a_parse_failure() {
        assert!(parse_event("this is not ics").is_err());
        assert!(parse_event("").is_err());
    }

    #[test]
    fn test_parse_recurrence_rule_and_alarm() {
        let ics = indoc! {"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Standup
            DTSTART;TZID=Europe/Berlin:20240101T090000
            DTEND;TZID=Europe/Berlin:20240101T091500
            RRULE:FREQ=DAILY;BYDAY=MO,TU,WE,TH,FR
            BEGIN:VALARM
            ACTION:DISPLAY
            TRIGGER:-PT5M
            DESCRIPTION:Standup soon
            END:VALARM
            END:VEVENT
            END:VCALENDAR
        "};

        let event = parse_event(ics).expect("Should parse");
        assert_eq!(event.rrule.as_deref(), Some("FREQ=DAILY;BYDAY=MO,TU,WE,TH,FR"));
        assert!(event.is_recurring());
        assert_eq!(
            event.reminders,
            vec![Reminder {
                action: AlarmAction::Display,
                trigger: "-PT5M".to_string(),
                description: Some("Standup soon".to_string()),
            }]
        );
        // VALARM's DESCRIPTION must not leak into the event
        assert_eq!(event.description, None);
    }

    #[test]
    fn test_parse_object_tags_instances_with_master_id() {
        let ics = indoc! {"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Team Standup
            DTSTART:20240102T090000Z
            DTEND:20240102T091500Z
            RECURRENCE-ID:20240102T090000Z
            END:VEVENT
            END:VCALENDAR
        "};
        let object = RawCalendarObject::new(
            "https://dav.example.com/cal/work/team-standup-1700000000000.ics",
            ics,
        );

        let events = parse_object(&object);
        assert_eq!(events.len(), 1);
        let event = events[0].as_ref().expect("Should parse");
        let instance = event.recurrence.as_ref().expect("Should be an instance");
        assert_eq!(
            instance.master_event_id.as_deref(),
            Some("team-standup-1700000000000")
        );
        assert!(event.is_recurrence_instance());
    }

    #[test]
    fn test_parse_master_prefers_event_without_recurrence_id() {
        let ics = indoc! {"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Override
            DTSTART:20240108T100000Z
            DTEND:20240108T110000Z
            RECURRENCE-ID:20240108T090000Z
            END:VEVENT
            BEGIN:VEVENT
            SUMMARY:Series
            DTSTART:20240101T090000Z
            DTEND:20240101T100000Z
            RRULE:FREQ=WEEKLY
            END:VEVENT
            END:VCALENDAR
        "};

        let master = parse_master_event(ics).expect("Should parse");
        assert_eq!(master.summary, "Series");
        assert_eq!(parse_events(ics).unwrap().len(), 2);
    }

    #[test]
    fn test_line_folding_is_unfolded() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:Test\r\n\
DTSTART:20240101T100000Z\r\n\
DTEND:20240101T110000Z\r\n\
DESCRIPTION:Hello \r\n world\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

        let event = parse_event(ics).expect("Should parse");
        assert_eq!(event.description.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_generate_then_parse_keeps_summary_and_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        let draft = EventDraft::new(
            "Dentist",
            tz.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2025, 6, 2, 16, 0, 0).unwrap(),
        );
        let ics = generate_ics(&draft, "dentist-1", Utc::now()).unwrap();

        let event = parse_event(&ics).expect("Should parse generated ICS");
        assert_eq!(event.summary, "Dentist");
        assert_eq!(event.start.tzid(), Some("America/New_York"));
        assert_eq!(event.end.tzid(), Some("America/New_York"));
        assert_eq!(event.uid.as_deref(), Some("dentist-1"));
    }
}
