//! MCP server exposing the calendar tools.

use std::sync::Arc;

use caldav_mcp_core::date_range::{DateRange, parse_timezone};
use caldav_mcp_core::service::CalendarService;
use chrono_tz::Tz;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use tracing::warn;

use crate::models::{CreateEventRequest, GetMasterEventRequest, ListEventsRequest};

type ToolResult = Result<CallToolResult, McpError>;

#[derive(Clone)]
pub struct CalendarMcp {
    service: Arc<CalendarService>,
    default_timezone: Tz,
    tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for CalendarMcp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalendarMcp")
            .field("default_timezone", &self.default_timezone)
            .field("tool_router", &self.tool_router)
            .finish()
    }
}

impl CalendarMcp {
    /// `service` must already be initialized.
    pub fn new(service: Arc<CalendarService>, default_timezone: Tz) -> Self {
        Self {
            service,
            default_timezone,
            tool_router: Self::tool_router(),
        }
    }

    fn text_result(text: impl Into<String>) -> ToolResult {
        Ok(CallToolResult::success(vec![Content::text(text.into())]))
    }

    fn error_result(msg: impl Into<String>) -> ToolResult {
        let msg = msg.into();
        warn!(error = %msg, "Tool call failed");
        Ok(CallToolResult::error(vec![Content::text(msg)]))
    }
}

#[tool_router]
impl CalendarMcp {
    #[tool(
        name = "list-calendars",
        description = "List the account's calendars with name, URL, description, timezone and color. Use a calendar's name as calendarName in other tools."
    )]
    async fn list_calendars(&self) -> ToolResult {
        match self.service.list_calendars().await {
            Ok(text) => Self::text_result(text),
            Err(e) => Self::error_result(format!("Failed to list calendars: {}", e)),
        }
    }

    #[tool(
        name = "create-event",
        description = "Create an event. start/end are local times (YYYY-MM-DDTHH:MM:SS) in the given IANA timezone. Optional RRULE recurrence, location, description and reminders. Returns the new event's URL."
    )]
    async fn create_event(&self, Parameters(req): Parameters<CreateEventRequest>) -> ToolResult {
        let draft = match req.to_draft() {
            Ok(draft) => draft,
            Err(e) => return Self::error_result(e.to_string()),
        };

        match self
            .service
            .create_event(&draft, req.calendar_name.as_deref())
            .await
        {
            Ok(url) => Self::text_result(url),
            Err(e) => Self::error_result(format!("Failed to create event: {}", e)),
        }
    }

    #[tool(
        name = "list-events",
        description = "List events overlapping a time range. start/end accept YYYY-MM-DD (whole days), local YYYY-MM-DDTHH:MM:SS, or RFC 3339. Recurrence instances include a Master Event ID for get-master-event."
    )]
    async fn list_events(&self, Parameters(req): Parameters<ListEventsRequest>) -> ToolResult {
        let tz = match req.timezone.as_deref() {
            Some(name) => match parse_timezone(name) {
                Ok(tz) => tz,
                Err(e) => return Self::error_result(e.to_string()),
            },
            None => self.default_timezone,
        };

        let range = match DateRange::from_args(&req.start, &req.end, tz) {
            Ok(range) => range,
            Err(e) => return Self::error_result(e.to_string()),
        };

        match self
            .service
            .list_events(&range, req.calendar_name.as_deref())
            .await
        {
            Ok(text) => Self::text_result(text),
            Err(e) => Self::error_result(format!("Failed to list events: {}", e)),
        }
    }

    #[tool(
        name = "get-master-event",
        description = "Get the master event of a recurring series by its event ID (the Master Event ID shown on recurrence instances)."
    )]
    async fn get_master_event(
        &self,
        Parameters(req): Parameters<GetMasterEventRequest>,
    ) -> ToolResult {
        match self
            .service
            .get_master_event(&req.event_id, req.calendar_name.as_deref())
            .await
        {
            Ok(text) => Self::text_result(text),
            Err(e) => Self::error_result(format!("Failed to get master event: {}", e)),
        }
    }
}

#[tool_handler]
impl ServerHandler for CalendarMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "CalDAV calendar tools. Start with list-calendars to see calendar names; list-events and create-event default to the first calendar.",
        )
    }
}
