//! WebDAV multistatus parsing shared by the CardDAV and CalDAV clients

use crate::error::DavError;
use quick_xml::Reader;
use quick_xml::events::Event;

/// One `<response>` of a 207 Multi-Status body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    pub etag: Option<String>,
    /// First status code found (propstat or response level)
    pub status: Option<u16>,
    /// Local names found inside `<resourcetype>` (e.g. "collection", "calendar")
    pub resource_types: Vec<String>,
    pub content_type: Option<String>,
    pub display_name: Option<String>,
    /// `address-data` or `calendar-data` payload
    pub data: Option<String>,
}

impl DavResponse {
    pub fn has_type(&self, name: &str) -> bool {
        self.resource_types.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_none_or(|s| (200..300).contains(&s))
    }
}

/// Parse a multistatus document into its responses
pub fn parse_multistatus(xml: &str) -> Result<Vec<DavResponse>, DavError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut responses = Vec::new();
    let mut current: Option<DavResponse> = None;
    let mut stack: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.local_name().as_ref());
                if name == "response" {
                    current = Some(DavResponse::default());
                }
                if let Some(response) = current.as_mut() {
                    if stack.last().is_some_and(|p| p == "resourcetype") {
                        response.resource_types.push(name.clone());
                    }
                }
                stack.push(name);
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.local_name().as_ref());
                if let Some(response) = current.as_mut() {
                    if stack.last().is_some_and(|p| p == "resourcetype") {
                        response.resource_types.push(name);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| DavError::Protocol(format!("invalid XML text: {}", e)))?;
                if let Some(response) = current.as_mut() {
                    apply_text(response, &stack, &text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                if let Some(response) = current.as_mut() {
                    apply_text(response, &stack, &text);
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.local_name().as_ref());
                stack.pop();
                if name == "response" {
                    if let Some(response) = current.take() {
                        responses.push(response);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DavError::Protocol(format!(
                    "XML parsing error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(responses)
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn apply_text(response: &mut DavResponse, stack: &[String], text: &str) {
    let Some(element) = stack.last() else {
        return;
    };
    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());

    match element.as_str() {
        "href" if parent == Some("response") => response.href.push_str(text.trim()),
        "getetag" => response.etag = Some(text.trim().to_string()),
        "status" if response.status.is_none() => response.status = parse_status_line(text),
        "getcontenttype" => response.content_type = Some(text.trim().to_string()),
        "displayname" => response.display_name = Some(text.trim().to_string()),
        "address-data" | "calendar-data" => response
            .data
            .get_or_insert_with(String::new)
            .push_str(text),
        _ => {}
    }
}

/// "HTTP/1.1 200 OK" -> 200
fn parse_status_line(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Resolve an href from a multistatus body against the request URL
pub fn resolve_url(base: &str, href: &str) -> Result<String, DavError> {
    let base = reqwest::Url::parse(base)
        .map_err(|e| DavError::Protocol(format!("invalid base URL '{}': {}", base, e)))?;
    base.join(href)
        .map(|u| u.to_string())
        .map_err(|e| DavError::Protocol(format!("invalid href '{}': {}", href, e)))
}

/// Compare two URLs ignoring a trailing slash
pub fn same_collection(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}
