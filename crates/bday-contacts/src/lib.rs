//! bday-contacts: CardDAV contact source for bday-sync
//!
//! ## Features
//!
//! - Address book discovery via `PROPFIND`
//! - Contact retrieval via `REPORT addressbook-query`
//! - Works with Nextcloud, Radicale and other RFC 6352 servers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bday_contacts::ContactsClient;
//! use bday_core::{ContactSource, DavConfig};
//!
//! let config = DavConfig::new("https://carddav.example.com/", "user", "password");
//! let client = ContactsClient::new(config, Duration::from_secs(30))?;
//!
//! let contacts = client.list_contacts().await?;
//! ```

pub mod client;
pub mod error;

pub use client::ContactsClient;
pub use error::{ContactsError, Result};
