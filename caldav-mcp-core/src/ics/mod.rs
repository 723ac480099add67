//! ICS generation and parsing.
//!
//! Only the subset of RFC 5545 needed for event summaries is handled: the
//! VEVENT properties shown to users plus VALARM reminders.

mod generate;
mod parse;

pub use generate::{PRODID, generate_ics};
pub use parse::{parse_event, parse_events, parse_master_event, parse_object};

use thiserror::Error;

/// Text shown in place of an event that could not be decoded.
pub const PARSE_FAILURE_MARKER: &str = "Could not parse event";

/// A single event failed to decode. Never fatal for a listing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {reason}", PARSE_FAILURE_MARKER)]
pub struct ParseFailure {
    pub reason: String,
}

impl ParseFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        ParseFailure {
            reason: reason.into(),
        }
    }
}
