//! `CalDavBackend` over libdav.

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use caldav_mcp_core::backend::CalDavBackend;
use caldav_mcp_core::calendar::{CalendarRef, RawCalendarObject};
use caldav_mcp_core::date_range::DateRange;
use caldav_mcp_core::error::{CalendarError, CalendarResult};
use http::Uri;
use libdav::caldav::{FindCalendarHomeSet, GetCalendarResources};
use libdav::dav::{PutResource, mime_types};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::caldav::{
    DavClient, GetCalendarResourcesInRange, ListCalendarCollections, absolute_url,
    create_caldav_client, object_url, url_to_href,
};

/// Connection settings for one CalDAV account.
#[derive(Debug, Clone)]
pub struct CalDavSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Use `base_url` directly instead of `/.well-known/caldav` discovery
    pub skip_well_known: bool,
}

pub struct LibDavBackend {
    caldav: DavClient,
    home_set: OnceCell<Uri>,
}

impl LibDavBackend {
    pub async fn connect(settings: &CalDavSettings) -> CalendarResult<Self> {
        let caldav = create_caldav_client(
            &settings.base_url,
            &settings.username,
            &settings.password,
            settings.skip_well_known,
        )
        .await
        .map_err(|e| CalendarError::remote("connect", e))?;

        debug!(
            base_url = %caldav.base_url(),
            skip_well_known = settings.skip_well_known,
            "CalDAV client created"
        );

        Ok(LibDavBackend {
            caldav,
            home_set: OnceCell::new(),
        })
    }

    /// Principal, then its calendar home set. Falls back to the base URL
    /// when the server doesn't advertise either.
    async fn discover_home_set(&self) -> anyhow::Result<Uri> {
        let principal = self
            .caldav
            .find_current_user_principal()
            .await
            .context("Failed to find current user principal")?;

        let Some(principal) = principal else {
            debug!("No current-user-principal, using base URL as calendar home");
            return Ok(self.caldav.base_url().clone());
        };

        let home_set_response = self
            .caldav
            .request(FindCalendarHomeSet::new(&principal))
            .await
            .context("Failed to find calendar home set")?;

        Ok(home_set_response
            .home_sets
            .into_iter()
            .next()
            .unwrap_or_else(|| self.caldav.base_url().clone()))
    }

    async fn home_set(&self) -> CalendarResult<&Uri> {
        self.home_set
            .get_or_try_init(|| self.discover_home_set())
            .await
            .map_err(|e| CalendarError::remote("authenticate", e))
    }

    fn absolute(&self, href: &str) -> String {
        absolute_url(self.caldav.base_url(), href)
    }

    async fn fetch_in_range(
        &self,
        calendar_href: &str,
        range: &DateRange,
    ) -> anyhow::Result<Vec<RawCalendarObject>> {
        let start = range.caldav_start();
        let end = range.caldav_end();

        let response = self
            .caldav
            .request(GetCalendarResourcesInRange::new(calendar_href, &start, &end))
            .await
            .context("Failed to query calendar resources in range")?;

        Ok(response
            .resources
            .into_iter()
            .map(|r| RawCalendarObject {
                url: self.absolute(&r.href),
                etag: r.etag,
                data: r.data,
            })
            .collect())
    }

    async fn fetch_all(&self, calendar_href: &str) -> anyhow::Result<Vec<RawCalendarObject>> {
        let response = self
            .caldav
            .request(GetCalendarResources::new(calendar_href))
            .await
            .context("Failed to fetch calendar resources")?;

        let mut objects = Vec::new();
        for resource in response.resources {
            match resource.content {
                Ok(content) => objects.push(RawCalendarObject {
                    url: self.absolute(&resource.href),
                    etag: Some(content.etag),
                    data: content.data,
                }),
                Err(status) => {
                    debug!(href = %resource.href, %status, "Skipping resource without content");
                }
            }
        }
        Ok(objects)
    }
}

#[async_trait]
impl CalDavBackend for LibDavBackend {
    async fn authenticate(&self) -> CalendarResult<()> {
        let home = self.home_set().await?;
        info!(home_set = %home, "Authenticated with CalDAV server");
        Ok(())
    }

    async fn list_calendars(&self) -> CalendarResult<Vec<CalendarRef>> {
        let home = self.home_set().await?;

        let response = self
            .caldav
            .request(ListCalendarCollections::new(home.path()))
            .await
            .map_err(|e| CalendarError::remote("Failed to list calendars", e))?;

        Ok(response
            .calendars
            .into_iter()
            .map(|c| CalendarRef {
                name: c.name(),
                url: self.absolute(&c.href),
                description: c.description,
                timezone: c.timezone,
                color: c.color,
                components: c.components,
            })
            .collect())
    }

    async fn fetch_objects(
        &self,
        calendar: &CalendarRef,
        range: Option<&DateRange>,
    ) -> CalendarResult<Vec<RawCalendarObject>> {
        let calendar_href = url_to_href(&calendar.url);

        if let Some(range) = range {
            match self.fetch_in_range(&calendar_href, range).await {
                Ok(objects) => return Ok(objects),
                Err(e) => {
                    warn!(
                        calendar = %calendar.name,
                        error = %e,
                        "Time-range query rejected, fetching all resources"
                    );
                }
            }
        }

        self.fetch_all(&calendar_href)
            .await
            .map_err(|e| CalendarError::remote(format!("Failed to list events in '{}'", calendar.name), e))
    }

    async fn fetch_object(
        &self,
        calendar: &CalendarRef,
        filename: &str,
    ) -> CalendarResult<Option<RawCalendarObject>> {
        let calendar_href = url_to_href(&calendar.url);
        let href = url_to_href(&object_url(&calendar.url, filename));

        let response = self
            .caldav
            .request(GetCalendarResources::new(&calendar_href).with_hrefs([&href]))
            .await
            .map_err(|e| CalendarError::remote(format!("Failed to fetch {}", filename), e))?;

        let Some(resource) = response.resources.into_iter().next() else {
            return Ok(None);
        };

        match resource.content {
            Ok(content) => Ok(Some(RawCalendarObject {
                url: self.absolute(&resource.href),
                etag: Some(content.etag),
                data: content.data,
            })),
            Err(status) if status == http::StatusCode::NOT_FOUND => Ok(None),
            Err(status) => Err(CalendarError::remote(
                format!("Failed to fetch {}", filename),
                anyhow!("server returned {}", status),
            )),
        }
    }

    async fn create_object(
        &self,
        calendar: &CalendarRef,
        filename: &str,
        data: &str,
    ) -> CalendarResult<String> {
        let url = object_url(&calendar.url, filename);
        let href = url_to_href(&url);

        // If-None-Match: * so an existing object is never overwritten
        self.caldav
            .request(PutResource::new(&href).create(data, mime_types::CALENDAR))
            .await
            .map_err(|e| CalendarError::remote(format!("Failed to create {}", filename), e))?;

        Ok(url)
    }
}
