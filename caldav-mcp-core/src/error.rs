//! Error types for caldav-mcp.

use thiserror::Error;

/// Errors that can occur in calendar operations.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("No calendars found for this account")]
    NoCalendars,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    /// A CalDAV request failed (network, auth, or server error).
    #[error("{context}: {source}")]
    Remote {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl CalendarError {
    pub fn remote(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    ) -> Self {
        CalendarError::Remote {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CalendarError::CalendarNotFound(_)
                | CalendarError::EventNotFound(_)
                | CalendarError::NoCalendars
        )
    }
}

/// Result type alias for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;
