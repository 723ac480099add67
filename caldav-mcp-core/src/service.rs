//! Calendar service: the operations behind the MCP tools.
//!
//! One `CalendarService` holds one backend and the calendar list discovered
//! at initialization. Everything except `initialize` requires the service to
//! be ready.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::backend::CalDavBackend;
use crate::calendar::{CalendarRef, event_filename, new_event_id};
use crate::date_range::DateRange;
use crate::error::{CalendarError, CalendarResult};
use crate::event::EventDraft;
use crate::filter::filter_objects;
use crate::format::{format_calendars, format_entries, format_event};
use crate::ics::{generate_ics, parse_master_event};

#[derive(Debug, Clone, PartialEq)]
enum ServiceState {
    Uninitialized,
    Initializing,
    Ready(Vec<CalendarRef>),
}

pub struct CalendarService {
    backend: Arc<dyn CalDavBackend>,
    state: RwLock<ServiceState>,
    server_side_filtering: bool,
}

impl CalendarService {
    pub fn new(backend: Arc<dyn CalDavBackend>) -> Self {
        CalendarService {
            backend,
            state: RwLock::new(ServiceState::Uninitialized),
            server_side_filtering: true,
        }
    }

    /// Ask the server for a time-range query with recurrence expansion when
    /// listing events (default on).
    pub fn with_server_side_filtering(mut self, enabled: bool) -> Self {
        self.server_side_filtering = enabled;
        self
    }

    /// Authenticate and load the calendar list. A no-op once ready.
    pub async fn initialize(&self) -> CalendarResult<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                ServiceState::Ready(_) => return Ok(()),
                ServiceState::Initializing => {
                    return Err(CalendarError::Config(
                        "calendar service is already initializing".to_string(),
                    ));
                }
                ServiceState::Uninitialized => *state = ServiceState::Initializing,
            }
        }

        let result = self.discover().await;

        let mut state = self.state.write().await;
        match result {
            Ok(calendars) => {
                info!(count = calendars.len(), "Calendar service ready");
                *state = ServiceState::Ready(calendars);
                Ok(())
            }
            Err(e) => {
                *state = ServiceState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn discover(&self) -> CalendarResult<Vec<CalendarRef>> {
        self.backend.authenticate().await?;

        let calendars = self.backend.list_calendars().await?;
        if calendars.is_empty() {
            return Err(CalendarError::NoCalendars);
        }

        for cal in &calendars {
            debug!(name = %cal.name, url = %cal.url, "Discovered calendar");
        }
        Ok(calendars)
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, ServiceState::Ready(_))
    }

    /// Calendars discovered at initialization, in discovery order.
    pub async fn calendars(&self) -> CalendarResult<Vec<CalendarRef>> {
        match &*self.state.read().await {
            ServiceState::Ready(calendars) => Ok(calendars.clone()),
            _ => Err(CalendarError::Config(
                "calendar service is not initialized (call initialize first)".to_string(),
            )),
        }
    }

    /// Calendar by exact display name; the first calendar when `name` is
    /// omitted or blank.
    pub async fn get_calendar(&self, name: Option<&str>) -> CalendarResult<CalendarRef> {
        let calendars = self.calendars().await?;

        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => calendars
                .into_iter()
                .find(|c| c.name == name)
                .ok_or_else(|| CalendarError::CalendarNotFound(name.to_string())),
            None => calendars.into_iter().next().ok_or(CalendarError::NoCalendars),
        }
    }

    pub async fn list_calendars(&self) -> CalendarResult<String> {
        Ok(format_calendars(&self.calendars().await?))
    }

    /// Write a new event and return its URL.
    pub async fn create_event(
        &self,
        draft: &EventDraft,
        calendar_name: Option<&str>,
    ) -> CalendarResult<String> {
        let calendar = self.get_calendar(calendar_name).await?;

        if draft.end < draft.start {
            return Err(CalendarError::InvalidInput(format!(
                "Event end ({}) is before its start ({})",
                draft.end.to_rfc3339(),
                draft.start.to_rfc3339()
            )));
        }

        let now = Utc::now();
        let event_id = new_event_id(&draft.summary, now);
        let filename = event_filename(&event_id);
        let ics = generate_ics(draft, &event_id, now)?;

        match self.backend.create_object(&calendar, &filename, &ics).await {
            Ok(url) => {
                info!(calendar = %calendar.name, url = %url, "Created event");
                Ok(url)
            }
            Err(e) => {
                error!(
                    calendar = %calendar.name,
                    filename = %filename,
                    error = %e,
                    "Failed to create event"
                );
                Err(e)
            }
        }
    }

    /// Events overlapping `range`, one block each, in server order.
    pub async fn list_events(
        &self,
        range: &DateRange,
        calendar_name: Option<&str>,
    ) -> CalendarResult<String> {
        let calendar = self.get_calendar(calendar_name).await?;

        let server_range = self.server_side_filtering.then_some(range);
        let objects = self.backend.fetch_objects(&calendar, server_range).await?;
        debug!(calendar = %calendar.name, count = objects.len(), "Fetched calendar objects");

        let entries = filter_objects(&objects, range);
        if entries.is_empty() {
            return Ok(format!(
                "No events found in calendar '{}' between {} and {}.",
                calendar.name,
                range.start.to_rfc3339(),
                range.end.to_rfc3339()
            ));
        }

        Ok(format_entries(&entries))
    }

    /// The master VEVENT stored as `<event_id>.ics`.
    pub async fn get_master_event(
        &self,
        event_id: &str,
        calendar_name: Option<&str>,
    ) -> CalendarResult<String> {
        let calendar = self.get_calendar(calendar_name).await?;

        let event_id = event_id.trim();
        if event_id.is_empty() || event_id.contains('/') {
            return Err(CalendarError::InvalidInput(format!(
                "Invalid event id '{}'",
                event_id
            )));
        }

        let filename = event_filename(event_id);
        let object = self
            .backend
            .fetch_object(&calendar, &filename)
            .await?
            .ok_or_else(|| {
                CalendarError::EventNotFound(format!("{} in calendar '{}'", event_id, calendar.name))
            })?;

        match parse_master_event(&object.data) {
            Ok(mut event) => {
                if let Some(ref mut instance) = event.recurrence {
                    instance.master_event_id = Some(object.event_id());
                }
                Ok(format_event(&event))
            }
            Err(failure) => Ok(failure.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_range::parse_timezone;
    use crate::ics::parse_event;
    use crate::testing::MemoryBackend;
    use chrono::TimeZone;
    use chrono_tz::Tz;
    use indoc::indoc;

    const WORK_URL: &str = "https://dav.example.com/cal/work/";
    const HOME_URL: &str = "https://dav.example.com/cal/home/";

    const STANDUP_INSTANCE: &str = indoc! {"
        BEGIN:VCALENDAR
        BEGIN:VEVENT
        UID:team-standup-1700000000000
        SUMMARY:Team Standup
        DTSTART:20240102T090000Z
        DTEND:20240102T091500Z
        RECURRENCE-ID:20240102T090000Z
        END:VEVENT
        END:VCALENDAR
    "};

    fn calendars() -> Vec<CalendarRef> {
        vec![
            CalendarRef::new("Work", WORK_URL),
            CalendarRef::new("Home", HOME_URL),
        ]
    }

    async fn ready_service(backend: MemoryBackend) -> (CalendarService, Arc<MemoryBackend>) {
        let backend = Arc::new(backend);
        let service = CalendarService::new(backend.clone());
        service.initialize().await.unwrap();
        (service, backend)
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let service = CalendarService::new(Arc::new(MemoryBackend::new(calendars())));

        let err = service.list_calendars().await.unwrap_err();
        assert!(matches!(err, CalendarError::Config(ref msg) if msg.contains("not initialized")));
        assert!(!service.is_ready().await);
    }

    #[tokio::test]
    async fn test_initialize_without_calendars_fails() {
        let service = CalendarService::new(Arc::new(MemoryBackend::new(Vec::new())));

        assert!(matches!(
            service.initialize().await,
            Err(CalendarError::NoCalendars)
        ));
        assert!(!service.is_ready().await);
    }

    #[tokio::test]
    async fn test_initialize_propagates_auth_failure() {
        let service = CalendarService::new(Arc::new(MemoryBackend::new(calendars()).failing_auth()));

        assert!(matches!(
            service.initialize().await,
            Err(CalendarError::Remote { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_calendar_defaults_to_first() {
        let (service, backend) = ready_service(MemoryBackend::new(calendars())).await;
        assert!(backend.is_authenticated());

        assert_eq!(service.get_calendar(None).await.unwrap().name, "Work");
        assert_eq!(service.get_calendar(Some("Home")).await.unwrap().url, HOME_URL);

        let err = service.get_calendar(Some("Nonexistent")).await.unwrap_err();
        assert!(matches!(err, CalendarError::CalendarNotFound(ref n) if n == "Nonexistent"));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_calendars_formats_blocks() {
        let (service, _) = ready_service(MemoryBackend::new(calendars())).await;

        let text = service.list_calendars().await.unwrap();
        assert_eq!(
            text,
            format!("Name: Work\nURL: {}\n\nName: Home\nURL: {}", WORK_URL, HOME_URL)
        );
    }

    #[tokio::test]
    async fn test_create_event_stores_ics_with_slug_filename() {
        let (service, backend) = ready_service(MemoryBackend::new(calendars())).await;

        let tz: Tz = parse_timezone("Europe/Berlin").unwrap();
        let draft = EventDraft::new(
            "Team Standup",
            tz.with_ymd_and_hms(2025, 3, 20, 10, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2025, 3, 20, 10, 30, 0).unwrap(),
        );

        let url = service.create_event(&draft, Some("Home")).await.unwrap();
        assert!(url.starts_with(&format!("{}team-standup-", HOME_URL)), "{}", url);
        assert!(url.ends_with(".ics"));

        let stored = backend.objects_in(HOME_URL);
        assert_eq!(stored.len(), 1);
        let event = parse_event(&stored[0].data).unwrap();
        assert_eq!(event.summary, "Team Standup");
        assert_eq!(event.start.tzid(), Some("Europe/Berlin"));
        assert_eq!(event.uid, Some(stored[0].event_id()));
    }

    #[tokio::test]
    async fn test_create_event_rejects_end_before_start() {
        let (service, backend) = ready_service(MemoryBackend::new(calendars())).await;

        let draft = EventDraft::new(
            "Backwards",
            Tz::UTC.with_ymd_and_hms(2025, 3, 20, 10, 0, 0).unwrap(),
            Tz::UTC.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap(),
        );
        assert!(matches!(
            service.create_event(&draft, None).await,
            Err(CalendarError::InvalidInput(_))
        ));
        assert!(backend.objects_in(WORK_URL).is_empty());
    }

    #[tokio::test]
    async fn test_create_event_propagates_write_failure() {
        let (service, _) = ready_service(MemoryBackend::new(calendars()).failing_writes()).await;

        let draft = EventDraft::new(
            "Lunch",
            Tz::UTC.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap(),
            Tz::UTC.with_ymd_and_hms(2025, 3, 20, 13, 0, 0).unwrap(),
        );
        let err = service.create_event(&draft, None).await.unwrap_err();
        assert!(err.to_string().contains("403 Forbidden"));
    }

    #[tokio::test]
    async fn test_list_events_shows_master_id_for_instances() {
        let backend = MemoryBackend::new(calendars()).with_object(
            WORK_URL,
            "team-standup-1700000000000.ics",
            STANDUP_INSTANCE,
        );
        let (service, backend) = ready_service(backend).await;

        let range = DateRange::from_args("2024-01-02", "2024-01-02", Tz::UTC).unwrap();
        let text = service.list_events(&range, None).await.unwrap();

        assert!(text.starts_with("Team Standup [Recurrence Instance]"));
        assert!(text.contains("Master Event ID: team-standup-1700000000000"));
        assert_eq!(backend.ranged_fetches(), 1);
    }

    #[tokio::test]
    async fn test_list_events_without_server_side_filtering() {
        let backend = Arc::new(MemoryBackend::new(calendars()).with_object(
            WORK_URL,
            "team-standup-1700000000000.ics",
            STANDUP_INSTANCE,
        ));
        let service = CalendarService::new(backend.clone()).with_server_side_filtering(false);
        service.initialize().await.unwrap();

        let range = DateRange::from_args("2024-01-03", "2024-01-04", Tz::UTC).unwrap();
        let text = service.list_events(&range, Some("Work")).await.unwrap();

        assert!(text.starts_with("No events found"));
        assert_eq!(backend.ranged_fetches(), 0);
    }

    #[tokio::test]
    async fn test_get_master_event() {
        let master = indoc! {"
            BEGIN:VCALENDAR
            BEGIN:VEVENT
            SUMMARY:Team Standup
            DTSTART;TZID=Europe/Berlin:20240101T090000
            DTEND;TZID=Europe/Berlin:20240101T091500
            RRULE:FREQ=DAILY
            END:VEVENT
            END:VCALENDAR
        "};
        let backend = MemoryBackend::new(calendars())
            .with_object(WORK_URL, "team-standup-1700000000000.ics", master)
            .with_object(WORK_URL, "broken.ics", "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n");
        let (service, _) = ready_service(backend).await;

        let text = service
            .get_master_event("team-standup-1700000000000", None)
            .await
            .unwrap();
        assert!(text.starts_with("Team Standup [Recurring]\n"));
        assert!(text.contains("Start: 2024-01-01T09:00:00 (Europe/Berlin)"));

        let text = service.get_master_event("broken.ics", None).await.unwrap();
        assert!(text.starts_with("Could not parse event"));

        assert!(matches!(
            service.get_master_event("missing", None).await,
            Err(CalendarError::EventNotFound(_))
        ));
        assert!(matches!(
            service.get_master_event("../other/x", None).await,
            Err(CalendarError::InvalidInput(_))
        ));
    }
}
