//! In-memory contact source and event sink for tests

use crate::error::DavError;
use crate::models::{Contact, DesiredEvent, EventHandle, ExistingEvent};
use crate::traits::{ContactSource, EventSink};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Address book backed by a vector
#[derive(Default)]
pub struct MemorySource {
    contacts: Vec<Contact>,
    error: Option<DavError>,
}

impl MemorySource {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self {
            contacts,
            error: None,
        }
    }

    pub fn failing(error: DavError) -> Self {
        Self {
            contacts: Vec::new(),
            error: Some(error),
        }
    }

    /// vCard with a UID, FN and BDAY
    pub fn vcard(uid: &str, name: &str, bday: &str) -> Contact {
        Contact::new(
            format!("/addressbooks/me/contacts/{}.vcf", uid),
            format!(
                "BEGIN:VCARD\r\nVERSION:3.0\r\nUID:{}\r\nFN:{}\r\nBDAY:{}\r\nEND:VCARD\r\n",
                uid, name, bday
            ),
        )
    }
}

#[async_trait]
impl ContactSource for MemorySource {
    async fn list_contacts(&self) -> Result<Vec<Contact>, DavError> {
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.contacts.clone()),
        }
    }
}

/// Calendar backed by a vector, with failure injection
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ExistingEvent>>,
    fail_create: Mutex<HashSet<String>>,
    list_error: Mutex<Option<DavError>>,
    delay: Mutex<Option<Duration>>,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create_for(&self, identity_key: &str) {
        self.fail_create.lock().unwrap().insert(identity_key.to_string());
    }

    pub fn fail_listing(&self, error: DavError) {
        *self.list_error.lock().unwrap() = Some(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    /// Simulate a manual edit on the server
    pub fn edit_summary(&self, identity_key: &str, summary: &str) {
        let mut events = self.events.lock().unwrap();
        if let Some(event) = events.iter_mut().find(|e| e.identity_key == identity_key) {
            event.content.summary = summary.to_string();
        }
    }

    pub fn summary_of(&self, identity_key: &str) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.identity_key == identity_key)
            .map(|e| e.content.summary.clone())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn list_events(&self) -> Result<Vec<ExistingEvent>, DavError> {
        if let Some(e) = self.list_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.events.lock().unwrap().clone())
    }

    async fn create_event(&self, event: &DesiredEvent) -> Result<EventHandle, DavError> {
        self.pause().await;
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.lock().unwrap().contains(&event.identity_key) {
            return Err(DavError::Validation(format!("rejected {}", event.uid)));
        }

        let handle = EventHandle {
            href: format!("/calendars/me/birthdays/{}.ics", event.uid),
            etag: Some("\"1\"".to_string()),
            uid: event.uid.clone(),
        };
        self.events.lock().unwrap().push(ExistingEvent {
            identity_key: event.identity_key.clone(),
            handle: handle.clone(),
            content: event.content.clone(),
        });
        Ok(handle)
    }

    async fn update_event(&self, handle: &EventHandle, event: &DesiredEvent) -> Result<(), DavError> {
        self.pause().await;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        let stored = events
            .iter_mut()
            .find(|e| e.handle.href == handle.href)
            .ok_or_else(|| DavError::Validation(format!("no object at {}", handle.href)))?;
        stored.content = event.content.clone();
        Ok(())
    }
}
