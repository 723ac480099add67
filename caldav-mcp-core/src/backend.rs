//! The CalDAV operations the calendar service needs.
//!
//! Implemented over libdav in `caldav-mcp-client`; tests use in-memory fakes.

use async_trait::async_trait;

use crate::calendar::{CalendarRef, RawCalendarObject};
use crate::date_range::DateRange;
use crate::error::CalendarResult;

#[async_trait]
pub trait CalDavBackend: Send + Sync {
    /// Resolve the principal and calendar home set for the configured account.
    async fn authenticate(&self) -> CalendarResult<()>;

    /// All calendar collections of the account, in discovery order.
    async fn list_calendars(&self) -> CalendarResult<Vec<CalendarRef>>;

    /// Calendar objects of one collection, in server order.
    ///
    /// With `range`, the server is asked for a time-range query with
    /// recurrence expansion; implementations may fall back to a full fetch.
    async fn fetch_objects(
        &self,
        calendar: &CalendarRef,
        range: Option<&DateRange>,
    ) -> CalendarResult<Vec<RawCalendarObject>>;

    /// A single object by filename, or `None` if the server has no such resource.
    async fn fetch_object(
        &self,
        calendar: &CalendarRef,
        filename: &str,
    ) -> CalendarResult<Option<RawCalendarObject>>;

    /// Store a new object and return its absolute URL.
    async fn create_object(
        &self,
        calendar: &CalendarRef,
        filename: &str,
        data: &str,
    ) -> CalendarResult<String>;
}
