//! libdav-backed CalDAV access for caldav-mcp.

pub mod backend;
pub mod caldav;

pub use backend::{CalDavSettings, LibDavBackend};
