//! CardDAV client implementation

use crate::error::{ContactsError, Result};
use async_trait::async_trait;
use bday_core::dav::{DavResponse, parse_multistatus, resolve_url, same_collection};
use bday_core::{Contact, ContactSource, DavConfig, DavError};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PROPFIND_ADDRESSBOOKS: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
    <D:prop>
        <D:resourcetype/>
        <D:displayname/>
    </D:prop>
</D:propfind>"#;

const ADDRESSBOOK_QUERY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<C:addressbook-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
    <D:prop>
        <D:getetag/>
        <C:address-data/>
    </D:prop>
</C:addressbook-query>"#;

/// CardDAV client reading contacts from one or more address books
pub struct ContactsClient {
    client: Client,
    config: DavConfig,
    base_url: String,
}

impl ContactsClient {
    /// Create a new CardDAV client
    pub fn new(config: DavConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ContactsError::Configuration(e.to_string()))?;

        let base_url = format!("{}/", config.server_url.trim_end_matches('/'));

        info!("Contacts client initialized for: {}", base_url);

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Discover the address books below the configured URL
    ///
    /// Falls back to the URL itself when it is an address book.
    pub async fn list_addressbooks(&self) -> Result<Vec<String>> {
        debug!("Discovering addressbooks at: {}", self.base_url);

        let text = self
            .send("PROPFIND", &self.base_url, PROPFIND_ADDRESSBOOKS)
            .await?;
        let addressbooks = parse_addressbooks_response(&self.base_url, &text)?;

        if addressbooks.is_empty() {
            return Err(ContactsError::NoAddressbooks(self.base_url.clone()));
        }

        info!("Discovered {} addressbooks", addressbooks.len());
        for url in &addressbooks {
            debug!("  - {}", url);
        }
        Ok(addressbooks)
    }

    /// Get all contacts of one address book
    pub async fn get_contacts(&self, addressbook_url: &str) -> Result<Vec<Contact>> {
        debug!("Fetching contacts from: {}", addressbook_url);

        let text = self
            .send("REPORT", addressbook_url, ADDRESSBOOK_QUERY)
            .await?;
        let contacts = parse_contacts_response(&text)?;

        info!("Fetched {} contacts from {}", contacts.len(), addressbook_url);
        Ok(contacts)
    }

    /// Configured address book, or every discovered one
    async fn addressbooks(&self) -> Result<Vec<String>> {
        match &self.config.collection {
            Some(path) => {
                let url = resolve_url(&self.base_url, path)
                    .map_err(|e| ContactsError::Configuration(e.to_string()))?;
                Ok(vec![url])
            }
            None => self.list_addressbooks().await,
        }
    }

    async fn send(&self, method: &str, url: &str, body: &'static str) -> Result<String> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| ContactsError::Configuration(e.to_string()))?;

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
            error!("CardDAV {} failed: {} - {}", method, status, error_text);
            return Err(ContactsError::from_status(
                status.as_u16(),
                &format!("{} {}", method, url),
            ));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl ContactSource for ContactsClient {
    async fn list_contacts(&self) -> std::result::Result<Vec<Contact>, DavError> {
        let mut all = Vec::new();
        for addressbook in self.addressbooks().await? {
            match self.get_contacts(&addressbook).await {
                Ok(contacts) => all.extend(contacts),
                // One unreadable address book out of several is not fatal
                Err(e) if self.config.collection.is_none() && !is_fatal(&e) => {
                    warn!("Skipping addressbook {}: {}", addressbook, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(all)
    }
}

fn is_fatal(e: &ContactsError) -> bool {
    matches!(
        e,
        ContactsError::Authentication(_) | ContactsError::Connection(_)
    )
}

/// Address book URLs from a PROPFIND multistatus
fn parse_addressbooks_response(base_url: &str, text: &str) -> Result<Vec<String>> {
    let responses = parse_multistatus(text).map_err(|e| ContactsError::XmlParseError(e.to_string()))?;

    let mut children = Vec::new();
    let mut itself = false;
    for response in responses.iter().filter(|r| r.is_ok() && r.has_type("addressbook")) {
        let url = absolute(base_url, response)?;
        if same_collection(&url, base_url) {
            itself = true;
        } else {
            children.push(url);
        }
    }

    if children.is_empty() && itself {
        info!("Provided URL appears to be a single addressbook");
        children.push(base_url.to_string());
    }
    Ok(children)
}

/// Contacts from an addressbook-query REPORT
fn parse_contacts_response(text: &str) -> Result<Vec<Contact>> {
    let responses = parse_multistatus(text).map_err(|e| ContactsError::XmlParseError(e.to_string()))?;

    Ok(responses
        .into_iter()
        .filter(|r| r.is_ok())
        .filter_map(|r| {
            let vcard = r.data?;
            if vcard.trim().is_empty() {
                return None;
            }
            let mut contact = Contact::new(r.href, vcard);
            contact.etag = r.etag;
            Some(contact)
        })
        .collect())
}

fn absolute(base_url: &str, response: &DavResponse) -> Result<String> {
    resolve_url(base_url, &response.href).map_err(|e| ContactsError::XmlParseError(e.to_string()))
}
