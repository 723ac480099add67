//! Server configuration.
//!
//! Sources, later ones winning:
//! - `<config_dir>/caldav-mcp/config.toml` (optional)
//! - `CALDAV_*` environment variables, after loading `.env`

use std::path::PathBuf;

use caldav_mcp_client::CalDavSettings;
use caldav_mcp_core::date_range::parse_timezone;
use caldav_mcp_core::error::{CalendarError, CalendarResult};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Configuration as read from files and environment, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_timezone: Option<String>,
    pub skip_well_known: Option<bool>,
    pub server_side_filtering: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub caldav: CalDavSettings,
    /// Zone used by list-events when the caller doesn't give one
    pub default_timezone: Tz,
    pub server_side_filtering: bool,
}

impl AppConfig {
    pub fn load() -> CalendarResult<Self> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        if let Some(path) = Self::config_path() {
            builder = builder.add_source(File::from(path).required(false));
        }

        let raw: RawConfig = builder
            .add_source(Environment::with_prefix("CALDAV").try_parsing(true))
            .build()
            .map_err(|e| CalendarError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalendarError::Config(e.to_string()))?;

        raw.validate()
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("caldav-mcp").join("config.toml"))
    }
}

impl RawConfig {
    pub fn validate(self) -> CalendarResult<AppConfig> {
        let base_url = required(self.base_url, "base URL", "CALDAV_BASE_URL")?;
        let username = required(self.username, "username", "CALDAV_USERNAME")?;
        let password = required(self.password, "password", "CALDAV_PASSWORD")?;

        let default_timezone = match self.default_timezone.as_deref() {
            Some(name) => parse_timezone(name).map_err(|e| CalendarError::Config(e.to_string()))?,
            None => Tz::UTC,
        };

        Ok(AppConfig {
            caldav: CalDavSettings {
                base_url,
                username,
                password,
                skip_well_known: self.skip_well_known.unwrap_or(true),
            },
            default_timezone,
            server_side_filtering: self.server_side_filtering.unwrap_or(true),
        })
    }
}

fn required(value: Option<String>, what: &str, env_var: &str) -> CalendarResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CalendarError::Config(format!("Missing CalDAV {} (set {})", what, env_var)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RawConfig {
        RawConfig {
            base_url: Some("https://dav.example.com/dav/".to_string()),
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let config = complete().validate().unwrap();

        assert_eq!(config.caldav.base_url, "https://dav.example.com/dav/");
        assert!(config.caldav.skip_well_known);
        assert!(config.server_side_filtering);
        assert_eq!(config.default_timezone, Tz::UTC);
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        let raw = RawConfig {
            base_url: None,
            ..complete()
        };
        let err = raw.validate().unwrap_err();
        assert!(matches!(err, CalendarError::Config(ref msg) if msg.contains("CALDAV_BASE_URL")));

        let raw = RawConfig {
            password: Some("  ".to_string()),
            ..complete()
        };
        assert!(matches!(raw.validate(), Err(CalendarError::Config(_))));
    }

    #[test]
    fn test_timezone_and_flags() {
        let raw = RawConfig {
            default_timezone: Some("Europe/Berlin".to_string()),
            skip_well_known: Some(false),
            server_side_filtering: Some(false),
            ..complete()
        };
        let config = raw.validate().unwrap();
        assert_eq!(config.default_timezone.name(), "Europe/Berlin");
        assert!(!config.caldav.skip_well_known);
        assert!(!config.server_side_filtering);

        let raw = RawConfig {
            default_timezone: Some("Nowhere/Special".to_string()),
            ..complete()
        };
        assert!(matches!(raw.validate(), Err(CalendarError::Config(_))));
    }
}
