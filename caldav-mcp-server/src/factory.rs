use std::sync::Arc;

use async_trait::async_trait;
use caldav_mcp_client::LibDavBackend;
use caldav_mcp_core::error::CalendarResult;
use caldav_mcp_core::service::CalendarService;
use tracing::info;

use crate::config::AppConfig;

/// Builds an initialized `CalendarService`: once per process for stdio,
/// once per session for HTTP.
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn create(&self) -> CalendarResult<CalendarService>;
}

/// Connects to the configured CalDAV account.
pub struct LibDavServiceFactory {
    config: AppConfig,
}

impl LibDavServiceFactory {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ServiceFactory for LibDavServiceFactory {
    async fn create(&self) -> CalendarResult<CalendarService> {
        let backend = LibDavBackend::connect(&self.config.caldav).await?;
        let service = CalendarService::new(Arc::new(backend))
            .with_server_side_filtering(self.config.server_side_filtering);

        service.initialize().await?;
        info!(base_url = %self.config.caldav.base_url, "Calendar service ready");

        Ok(service)
    }
}
