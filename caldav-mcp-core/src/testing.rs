//! In-memory `CalDavBackend` for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::backend::CalDavBackend;
use crate::calendar::{CalendarRef, RawCalendarObject};
use crate::date_range::DateRange;
use crate::error::{CalendarError, CalendarResult};

#[derive(Default)]
pub struct MemoryBackend {
    calendars: Vec<CalendarRef>,
    /// (collection URL, object) in insertion order
    objects: Mutex<Vec<(String, RawCalendarObject)>>,
    fail_auth: bool,
    fail_writes: bool,
    authenticated: AtomicBool,
    ranged_fetches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(calendars: Vec<CalendarRef>) -> Self {
        MemoryBackend {
            calendars,
            ..Default::default()
        }
    }

    /// Store an object in the calendar whose URL is `calendar_url`.
    pub fn with_object(self, calendar_url: &str, filename: &str, data: &str) -> Self {
        let url = format!("{}{}", calendar_url, filename);
        if let Ok(mut objects) = self.objects.lock() {
            objects.push((calendar_url.to_string(), RawCalendarObject::new(url, data)));
        }
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.fail_auth = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Number of fetches that asked for a server-side time range.
    pub fn ranged_fetches(&self) -> usize {
        self.ranged_fetches.load(Ordering::SeqCst)
    }

    pub fn objects_in(&self, calendar_url: &str) -> Vec<RawCalendarObject> {
        self.objects
            .lock()
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(cal, _)| cal == calendar_url)
                    .map(|(_, obj)| obj.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl CalDavBackend for MemoryBackend {
    async fn authenticate(&self) -> CalendarResult<()> {
        if self.fail_auth {
            return Err(CalendarError::remote("authenticate", "401 Unauthorized"));
        }
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn list_calendars(&self) -> CalendarResult<Vec<CalendarRef>> {
        Ok(self.calendars.clone())
    }

    async fn fetch_objects(
        &self,
        calendar: &CalendarRef,
        range: Option<&DateRange>,
    ) -> CalendarResult<Vec<RawCalendarObject>> {
        if range.is_some() {
            self.ranged_fetches.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.objects_in(&calendar.url))
    }

    async fn fetch_object(
        &self,
        calendar: &CalendarRef,
        filename: &str,
    ) -> CalendarResult<Option<RawCalendarObject>> {
        let url = format!("{}{}", calendar.url, filename);
        Ok(self
            .objects_in(&calendar.url)
            .into_iter()
            .find(|obj| obj.url == url))
    }

    async fn create_object(
        &self,
        calendar: &CalendarRef,
        filename: &str,
        data: &str,
    ) -> CalendarResult<String> {
        if self.fail_writes {
            return Err(CalendarError::remote(
                format!("PUT {}{}", calendar.url, filename),
                "403 Forbidden",
            ));
        }

        let url = format!("{}{}", calendar.url, filename);
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| CalendarError::remote("create_object", "object store poisoned"))?;
        objects.push((calendar.url.clone(), RawCalendarObject::new(url.clone(), data)));
        Ok(url)
    }
}
