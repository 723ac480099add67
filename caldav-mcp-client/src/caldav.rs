//! CalDAV client helpers using libdav.
//!
//! Builds the libdav client and the custom requests libdav doesn't provide:
//! calendar collection listing with display properties and time-range
//! queries with recurrence expansion.

use anyhow::{Context, Result};
use http::{Method, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use libdav::CalDavClient;
use libdav::dav::WebDavClient;
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use tower::ServiceBuilder;
use tower_http::{auth::AddAuthorization, follow_redirect::FollowRedirect};

/// Type alias for the HTTP client with auth and redirect following.
type HttpClient = FollowRedirect<
    AddAuthorization<
        Client<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>, String>,
    >,
>;

/// Type alias for our CalDAV client.
pub type DavClient = CalDavClient<HttpClient>;

/// Create a libdav CalDavClient.
///
/// The client is configured with:
/// - Basic authentication using the provided credentials
/// - Automatic redirect following
/// - HTTPS support
///
/// With `skip_well_known`, `base_url` is used as the discovered context path
/// and no `/.well-known/caldav` request is made. Otherwise service discovery
/// runs for this client only.
pub async fn create_caldav_client(
    base_url: &str,
    username: &str,
    password: &str,
    skip_well_known: bool,
) -> Result<DavClient> {
    let uri: Uri = base_url
        .parse()
        .with_context(|| format!("Invalid base URL: {}", base_url))?;

    let https_connector = HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("Failed to load native TLS roots")?
        .https_or_http()
        .enable_http1()
        .build();

    let http_client = Client::builder(TokioExecutor::new()).build(https_connector);

    let auth_client = AddAuthorization::basic(http_client, username, password);

    // Some servers redirect to per-user hosts
    let client = ServiceBuilder::new()
        .layer(tower_http::follow_redirect::FollowRedirectLayer::new())
        .service(auth_client);

    let webdav = WebDavClient::new(uri, client);

    if skip_well_known {
        return Ok(CalDavClient::new(webdav));
    }

    CalDavClient::bootstrap_via_service_discovery(webdav)
        .await
        .context("CalDAV service discovery failed")
}

/// Build the absolute URL for an href returned by the server.
pub fn absolute_url(base: &Uri, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    format!(
        "{}://{}{}",
        base.scheme_str().unwrap_or("https"),
        base.authority().map(|a| a.as_str()).unwrap_or_default(),
        href
    )
}

/// Extract the href path from a full URL.
///
/// Converts "https://dav.example.com/123/calendars/abc/" to "/123/calendars/abc/"
pub fn url_to_href(url: &str) -> String {
    if let Ok(uri) = url.parse::<Uri>() {
        uri.path().to_string()
    } else {
        url.to_string()
    }
}

/// Build the URL for an object inside a collection.
pub fn object_url(calendar_url: &str, filename: &str) -> String {
    format!("{}/{}", calendar_url.trim_end_matches('/'), filename)
}

// ============================================================================
// Calendar collection listing
// ============================================================================

/// PROPFIND (Depth 1) on a calendar home set, returning calendar collections
/// with their display properties.
pub struct ListCalendarCollections<'a> {
    home_href: &'a str,
}

impl<'a> ListCalendarCollections<'a> {
    pub fn new(home_href: &'a str) -> Self {
        Self { home_href }
    }
}

/// A calendar collection found under the home set.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCollection {
    pub href: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// TZID taken from the collection's calendar-timezone
    pub timezone: Option<String>,
    pub color: Option<String>,
    pub components: Vec<String>,
}

impl CalendarCollection {
    /// Display name, falling back to the last path segment.
    pub fn name(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| {
            self.href
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or("Calendar")
                .to_string()
        })
    }
}

#[derive(Debug)]
pub struct ListCalendarCollectionsResponse {
    pub calendars: Vec<CalendarCollection>,
}

impl DavRequest for ListCalendarCollections<'_> {
    type Response = ListCalendarCollectionsResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" xmlns:ic="http://apple.com/ns/ical/">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <c:calendar-description/>
    <c:calendar-timezone/>
    <c:supported-calendar-component-set/>
    <ic:calendar-color/>
  </d:prop>
</d:propfind>"#;

        Ok(PreparedRequest {
            method: Method::from_bytes(b"PROPFIND")?,
            path: self.home_href.to_string(),
            body: body.to_string(),
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }

        let calendars = parse_calendar_collections(body)?;
        Ok(ListCalendarCollectionsResponse { calendars })
    }
}

/// Parse calendar collections from a PROPFIND multistatus response.
///
/// Only responses whose resourcetype contains `calendar` are kept; the home
/// set itself is a plain collection and drops out.
fn parse_calendar_collections(
    body: &[u8],
) -> std::result::Result<Vec<CalendarCollection>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut calendars = Vec::new();

    for response in root.descendants().filter(|n| n.tag_name().name() == "response") {
        let Some(href) = child_text(&response, "href") else {
            continue;
        };

        let is_calendar = response
            .descendants()
            .find(|n| n.tag_name().name() == "resourcetype")
            .is_some_and(|rt| rt.children().any(|c| c.tag_name().name() == "calendar"));
        if !is_calendar {
            continue;
        }

        let components = response
            .descendants()
            .filter(|n| n.tag_name().name() == "comp")
            .filter_map(|n| n.attribute("name"))
            .map(|s| s.to_string())
            .collect();

        calendars.push(CalendarCollection {
            href,
            display_name: child_text(&response, "displayname"),
            description: child_text(&response, "calendar-description"),
            timezone: child_text(&response, "calendar-timezone")
                .as_deref()
                .and_then(extract_tzid),
            color: child_text(&response, "calendar-color").map(normalize_color),
            components,
        });
    }

    Ok(calendars)
}

/// Trimmed text of the first descendant named `name`, if non-empty.
fn child_text(node: &roxmltree::Node, name: &str) -> Option<String> {
    node.descendants()
        .find(|n| n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Pull the TZID out of a calendar-timezone VCALENDAR/VTIMEZONE value.
fn extract_tzid(vtimezone: &str) -> Option<String> {
    vtimezone
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("TZID:"))
        .map(|tzid| tzid.trim().to_string())
}

/// Colors come back as #RRGGBBAA from some servers, convert to #RRGGBB.
fn normalize_color(color: String) -> String {
    match color.get(..7) {
        Some(rgb) if color.len() == 9 && color.is_ascii() && color.starts_with('#') => {
            rgb.to_string()
        }
        _ => color,
    }
}

// ============================================================================
// Custom CalDAV request for time-range filtered calendar queries
// ============================================================================

/// Request to fetch calendar resources with server-side time-range filtering.
///
/// This uses the CalDAV calendar-query REPORT with a time-range filter and
/// asks the server to expand recurring events into instances inside the
/// range.
pub struct GetCalendarResourcesInRange<'a> {
    collection_href: &'a str,
    start: &'a str,
    end: &'a str,
}

impl<'a> GetCalendarResourcesInRange<'a> {
    /// Create a new request to fetch calendar resources within a time range.
    ///
    /// `start` and `end` must be in CalDAV format: `YYYYMMDDTHHMMSSZ`
    pub fn new(collection_href: &'a str, start: &'a str, end: &'a str) -> Self {
        Self {
            collection_href,
            start,
            end,
        }
    }
}

/// A fetched calendar resource with its ICS data.
#[derive(Debug, PartialEq)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

/// Response from a [`GetCalendarResourcesInRange`] request.
#[derive(Debug)]
pub struct GetCalendarResourcesInRangeResponse {
    pub resources: Vec<CalendarResource>,
}

impl DavRequest for GetCalendarResourcesInRange<'_> {
    type Response = GetCalendarResourcesInRangeResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        let body = format!(
            r#"<C:calendar-query xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <prop>
        <getetag/>
        <C:calendar-data>
            <C:expand start="{start}" end="{end}"/>
        </C:calendar-data>
    </prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT">
                <C:time-range start="{start}" end="{end}"/>
            </C:comp-filter>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#,
            start = self.start,
            end = self.end
        );

        Ok(PreparedRequest {
            method: Method::from_bytes(b"REPORT")?,
            path: self.collection_href.to_string(),
            body,
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }

        let resources = parse_calendar_resources(body)?;
        Ok(GetCalendarResourcesInRangeResponse { resources })
    }
}

/// Parse calendar resources from a CalDAV multistatus response.
fn parse_calendar_resources(
    body: &[u8],
) -> std::result::Result<Vec<CalendarResource>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut resources = Vec::new();

    for response in root.descendants().filter(|n| n.tag_name().name() == "response") {
        let Some(href) = child_text(&response, "href") else {
            continue;
        };

        let etag = child_text(&response, "getetag");

        // calendar-data is kept verbatim; trimming would eat the final CRLF
        let data = response
            .descendants()
            .find(|n| n.tag_name().name() == "calendar-data")
            .and_then(|n| n.text())
            .map(|s| s.to_string());

        // Only include resources that have calendar data
        if let Some(data) = data {
            resources.push(CalendarResource { href, etag, data });
        }
    }

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTIONS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav" xmlns:ic="http://apple.com/ns/ical/">
  <d:response>
    <d:href>/dav/calendars/alice/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/></d:resourcetype>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/work/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Work</d:displayname>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
        <c:calendar-description>Office things</c:calendar-description>
        <c:calendar-timezone>BEGIN:VCALENDAR
BEGIN:VTIMEZONE
TZID:Europe/Berlin
END:VTIMEZONE
END:VCALENDAR
</c:calendar-timezone>
        <c:supported-calendar-component-set>
          <c:comp name="VEVENT"/>
          <c:comp name="VTODO"/>
        </c:supported-calendar-component-set>
        <ic:calendar-color>#FF2968FF</ic:calendar-color>
      </d:prop>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/dav/calendars/alice/personal/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/><c:calendar/></d:resourcetype>
      </d:prop>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn test_parse_calendar_collections() {
        let calendars = parse_calendar_collections(COLLECTIONS.as_bytes()).unwrap();

        assert_eq!(calendars.len(), 2, "home set must not be listed");

        let work = &calendars[0];
        assert_eq!(work.name(), "Work");
        assert_eq!(work.href, "/dav/calendars/alice/work/");
        assert_eq!(work.description.as_deref(), Some("Office things"));
        assert_eq!(work.timezone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(work.color.as_deref(), Some("#FF2968"));
        assert_eq!(work.components, vec!["VEVENT", "VTODO"]);

        let personal = &calendars[1];
        assert_eq!(personal.name(), "personal");
        assert_eq!(personal.color, None);
    }

    #[test]
    fn test_normalize_color() {
        assert_eq!(normalize_color("#FF2968FF".to_string()), "#FF2968");
        assert_eq!(normalize_color("#FF2968".to_string()), "#FF2968");

        // 9 bytes, but not ASCII
        let odd = "#a\u{e4}\u{e4}\u{e4}a";
        assert_eq!(odd.len(), 9);
        assert_eq!(normalize_color(odd.to_string()), odd);

        let xml = COLLECTIONS.replace("#FF2968FF", odd);
        let calendars = parse_calendar_collections(xml.as_bytes()).unwrap();
        assert_eq!(calendars[0].color.as_deref(), Some(odd));
    }

    #[test]
    fn test_parse_calendar_resources() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<multistatus xmlns="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <response>
    <href>/dav/calendars/alice/work/a.ics</href>
    <propstat>
      <prop>
        <getetag>"1"</getetag>
        <C:calendar-data>BEGIN:VCALENDAR
END:VCALENDAR
</C:calendar-data>
      </prop>
    </propstat>
  </response>
  <response>
    <href>/dav/calendars/alice/work/gone.ics</href>
    <status>HTTP/1.1 404 Not Found</status>
  </response>
</multistatus>"#;

        let resources = parse_calendar_resources(body.as_bytes()).unwrap();
        assert_eq!(
            resources,
            vec![CalendarResource {
                href: "/dav/calendars/alice/work/a.ics".to_string(),
                etag: Some("\"1\"".to_string()),
                data: "BEGIN:VCALENDAR\nEND:VCALENDAR\n".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_rejects_invalid_xml() {
        assert!(parse_calendar_resources(b"<multistatus>").is_err());
    }

    #[test]
    fn test_url_helpers() {
        let base: Uri = "https://dav.example.com/dav/".parse().unwrap();
        assert_eq!(
            absolute_url(&base, "/dav/calendars/alice/work/"),
            "https://dav.example.com/dav/calendars/alice/work/"
        );
        assert_eq!(
            absolute_url(&base, "https://other.example.com/x/"),
            "https://other.example.com/x/"
        );
        assert_eq!(
            url_to_href("https://dav.example.com/dav/calendars/alice/work/"),
            "/dav/calendars/alice/work/"
        );
        assert_eq!(
            object_url("https://dav.example.com/cal/work/", "a.ics"),
            "https://dav.example.com/cal/work/a.ics"
        );
    }

    #[test]
    fn test_range_request_asks_for_expansion() {
        let request = GetCalendarResourcesInRange::new("/cal/work/", "20240101T000000Z", "20240102T000000Z");
        let prepared = request.prepare_request().unwrap();

        assert_eq!(prepared.method.as_str(), "REPORT");
        assert_eq!(prepared.path, "/cal/work/");
        assert!(prepared.body.contains(r#"<C:expand start="20240101T000000Z" end="20240102T000000Z"/>"#));
        assert!(prepared.body.contains(r#"<C:time-range start="20240101T000000Z""#));
    }
}
