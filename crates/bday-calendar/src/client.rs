//! CalDAV client implementation

use crate::error::{CalendarError, Result};
use crate::ical::{parse_event, to_ical};
use async_trait::async_trait;
use bday_core::dav::{DavResponse, parse_multistatus, resolve_url, same_collection};
use bday_core::{DavConfig, DavError, DesiredEvent, EventHandle, EventSink, ExistingEvent};
use chrono::Utc;
use reqwest::header::ETAG;
use reqwest::{Client, Method};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

const PROPFIND_CALENDARS: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
    <D:prop>
        <D:resourcetype/>
        <D:displayname/>
    </D:prop>
</D:propfind>"#;

const CALENDAR_QUERY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
    <D:prop>
        <D:getetag/>
        <C:calendar-data/>
    </D:prop>
    <C:filter>
        <C:comp-filter name="VCALENDAR">
            <C:comp-filter name="VEVENT"/>
        </C:comp-filter>
    </C:filter>
</C:calendar-query>"#;

/// CalDAV client writing birthday events to one calendar
pub struct CalendarClient {
    client: Client,
    config: DavConfig,
    base_url: String,
    calendar_url: OnceCell<String>,
}

impl CalendarClient {
    /// Create a new CalDAV client
    pub fn new(config: DavConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CalendarError::Configuration(e.to_string()))?;

        let base_url = format!("{}/", config.server_url.trim_end_matches('/'));

        info!("Calendar client initialized for: {}", base_url);

        Ok(Self {
            client,
            config,
            base_url,
            calendar_url: OnceCell::new(),
        })
    }

    /// Calendar collection in use, resolved once per process
    pub async fn calendar_url(&self) -> Result<&str> {
        self.calendar_url
            .get_or_try_init(|| self.resolve_calendar())
            .await
            .map(String::as_str)
    }

    /// Calendar collections at the configured URL (the URL itself included)
    pub async fn list_calendars(&self) -> Result<Vec<String>> {
        let text = self
            .dav_request("PROPFIND", &self.base_url, PROPFIND_CALENDARS)
            .await?;
        parse_calendars_response(&self.base_url, &text)
    }

    async fn resolve_calendar(&self) -> Result<String> {
        if let Some(path) = &self.config.collection {
            let url = resolve_url(&self.base_url, path)
                .map_err(|e| CalendarError::Configuration(e.to_string()))?;
            let url = format!("{}/", url.trim_end_matches('/'));
            info!("Using configured calendar: {}", url);
            return Ok(url);
        }

        let url = self
            .list_calendars()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CalendarError::NoCalendars(self.base_url.clone()))?;
        info!("Using calendar: {}", url);
        Ok(url)
    }

    /// Fetch every VEVENT of the calendar and keep the ones carrying an identity key
    pub async fn get_events(&self) -> Result<Vec<ExistingEvent>> {
        let calendar = self.calendar_url().await?;
        debug!("Fetching events from: {}", calendar);

        let text = self.dav_request("REPORT", calendar, CALENDAR_QUERY).await?;
        let events = parse_events_response(&text)?;

        info!("Found {} birthday events on calendar", events.len());
        Ok(events)
    }

    async fn dav_request(&self, method: &str, url: &str, body: &'static str) -> Result<String> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| CalendarError::Configuration(e.to_string()))?;

        let response = self
            .client
            .request(method.clone(), url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Depth", "1")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("CalDAV {} failed: {} - {}", method, status, error_text);
            return Err(CalendarError::from_status(
                status.as_u16(),
                &format!("{} {}", method, url),
            ));
        }

        Ok(response.text().await?)
    }

    /// PUT a calendar object under a precondition, returning the new ETag if sent
    async fn put(&self, url: &str, body: String, precondition: (&str, &str)) -> Result<Option<String>> {
        let response = self
            .client
            .put(url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Content-Type", "text/calendar; charset=utf-8")
            .header(precondition.0, precondition.1)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("PUT {} failed: {} - {}", url, status, error_text);
            return Err(CalendarError::from_write_status(
                status.as_u16(),
                &format!("PUT {}", url),
            ));
        }

        Ok(response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string))
    }
}

#[async_trait]
impl EventSink for CalendarClient {
    async fn list_events(&self) -> std::result::Result<Vec<ExistingEvent>, DavError> {
        Ok(self.get_events().await?)
    }

    async fn create_event(&self, event: &DesiredEvent) -> std::result::Result<EventHandle, DavError> {
        let calendar = self.calendar_url().await?;
        let url = format!("{}{}.ics", calendar, event.uid);

        debug!("Creating event {} for {}", event.uid, event.display_name);
        let etag = self
            .put(&url, to_ical(event, Utc::now()), ("If-None-Match", "*"))
            .await?;

        Ok(EventHandle {
            href: url,
            etag,
            uid: event.uid.clone(),
        })
    }

    async fn update_event(
        &self,
        handle: &EventHandle,
        event: &DesiredEvent,
    ) -> std::result::Result<(), DavError> {
        let calendar = self.calendar_url().await?;
        let url = resolve_url(calendar, &handle.href)?;

        // The stored UID wins so the object keeps its identity on the server
        let mut event = event.clone();
        event.uid = handle.uid.clone();

        debug!("Updating event {} for {}", event.uid, event.display_name);
        let etag = handle.etag.as_deref().unwrap_or("*");
        self.put(&url, to_ical(&event, Utc::now()), ("If-Match", etag))
            .await?;
        Ok(())
    }
}

/// Calendar URLs from a PROPFIND multistatus, the requested URL first
fn parse_calendars_response(base_url: &str, text: &str) -> Result<Vec<String>> {
    let responses = parse_multistatus(text).map_err(|e| CalendarError::XmlParseError(e.to_string()))?;

    let mut itself = None;
    let mut children = Vec::new();
    for response in responses.iter().filter(|r| r.is_ok() && r.has_type("calendar")) {
        let url = absolute(base_url, response)?;
        let url = format!("{}/", url.trim_end_matches('/'));
        if same_collection(&url, base_url) {
            itself = Some(url);
        } else {
            children.push(url);
        }
    }

    Ok(itself.into_iter().chain(children).collect())
}

/// Birthday events from a calendar-query REPORT
fn parse_events_response(text: &str) -> Result<Vec<ExistingEvent>> {
    let responses = parse_multistatus(text).map_err(|e| CalendarError::XmlParseError(e.to_string()))?;

    let mut events = Vec::new();
    for response in responses.into_iter().filter(|r| r.is_ok()) {
        let Some(data) = response.data.as_deref() else {
            continue;
        };
        let Some(parsed) = parse_event(data) else {
            debug!("Skipping unparsable calendar object {}", response.href);
            continue;
        };
        // Not ours
        let Some(identity_key) = parsed.identity_key else {
            continue;
        };
        events.push(ExistingEvent {
            identity_key,
            handle: EventHandle {
                href: response.href,
                etag: response.etag,
                uid: parsed.uid,
            },
            content: parsed.content,
        });
    }
    Ok(events)
}

fn absolute(base_url: &str, response: &DavResponse) -> Result<String> {
    resolve_url(base_url, &response.href).map_err(|e| CalendarError::XmlParseError(e.to_string()))
}
