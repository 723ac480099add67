//! MCP server exposing CalDAV calendars as tools, over stdio or HTTP.

pub mod config;
pub mod factory;
pub mod http;
pub mod models;
pub mod session;
pub mod tools;

pub use config::AppConfig;
pub use factory::{LibDavServiceFactory, ServiceFactory};
pub use tools::CalendarMcp;
