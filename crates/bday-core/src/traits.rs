//! Capability traits for the two remote collections
//!
//! Server flavours (Nextcloud, Radicale, ...) differ only in configuration;
//! the sync logic sees nothing but these operations.

use async_trait::async_trait;

use crate::error::DavError;
use crate::models::{Contact, DesiredEvent, EventHandle, ExistingEvent};

/// Read access to an address book
#[async_trait]
pub trait ContactSource: Send + Sync {
    /// Fetch every contact of the configured address book(s)
    ///
    /// Fails only at the collection level (unreachable server, bad credentials).
    async fn list_contacts(&self) -> Result<Vec<Contact>, DavError>;
}

/// Read/write access to the birthday calendar
#[async_trait]
pub trait EventSink: Send + Sync {
    /// List the events carrying an identity key
    async fn list_events(&self) -> Result<Vec<ExistingEvent>, DavError>;

    /// Store a new event and return its server handle
    async fn create_event(&self, event: &DesiredEvent) -> Result<EventHandle, DavError>;

    /// Overwrite the object behind `handle` with `event`
    async fn update_event(&self, handle: &EventHandle, event: &DesiredEvent) -> Result<(), DavError>;
}
