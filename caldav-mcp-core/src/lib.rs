//! Core of caldav-mcp.
//!
//! This crate holds everything that does not talk to the network:
//! - `event`, `calendar` and `date_range` data types
//! - `ics` encoder and decoder
//! - `filter` and `recurrence` for selecting events in a window
//! - `service`, the calendar operations behind the MCP tools, written
//!   against the `CalDavBackend` trait

pub mod backend;
pub mod calendar;
pub mod date_range;
pub mod error;
pub mod event;
pub mod filter;
pub mod format;
pub mod ics;
pub mod recurrence;
pub mod service;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::CalDavBackend;
pub use calendar::{CalendarRef, RawCalendarObject};
pub use date_range::DateRange;
pub use error::{CalendarError, CalendarResult};
pub use event::*;
pub use service::CalendarService;
