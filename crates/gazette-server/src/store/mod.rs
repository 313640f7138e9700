//! Newsletter storage.
//!
//! Writes commit through a [`NewsletterStore`]; each backend also hands out the
//! change source its commits are announced on.

mod memory;
mod postgres;
pub mod trigger;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::NaiveDateTime;
use gazette_relay::{ChangeSource, ChannelSource, PgChangeSource, RelayError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Watched table.
pub const NEWSLETTER_TABLE: &str = "newsletters";

/// Columns copied into every change notification.
pub const NEWSLETTER_COLUMNS: [&str; 4] = ["id", "title", "content", "created_at"];

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// A stored newsletter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Newsletter {
    pub id: i32,
    pub title: String,
    pub content: String,
    /// UTC, set on insert.
    pub created_at: NaiveDateTime,
}

/// Create and update request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNewsletter {
    pub title: String,
    pub content: String,
}

/// Storage backend.
#[derive(Debug)]
pub enum NewsletterStore {
    Postgres(PgStore),
    Memory(MemoryStore),
}

impl NewsletterStore {
    /// Backend name for logs and health output.
    pub fn backend(&self) -> &'static str {
        match self {
            NewsletterStore::Postgres(_) => "postgres",
            NewsletterStore::Memory(_) => "memory",
        }
    }

    /// Insert a row.
    pub async fn create(&self, new: &NewNewsletter) -> Result<Newsletter, StoreError> {
        match self {
            NewsletterStore::Postgres(store) => store.create(new).await,
            NewsletterStore::Memory(store) => store.create(new),
        }
    }

    /// All rows, newest first.
    pub async fn list(&self) -> Result<Vec<Newsletter>, StoreError> {
        match self {
            NewsletterStore::Postgres(store) => store.list().await,
            NewsletterStore::Memory(store) => Ok(store.list()),
        }
    }

    /// Replace title and content of row `id`. `None` if there is no such row.
    pub async fn update(
        &self,
        id: i32,
        changes: &NewNewsletter,
    ) -> Result<Option<Newsletter>, StoreError> {
        match self {
            NewsletterStore::Postgres(store) => store.update(id, changes).await,
            NewsletterStore::Memory(store) => store.update(id, changes),
        }
    }

    /// Check that the backend is reachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            NewsletterStore::Postgres(store) => store.ping().await,
            NewsletterStore::Memory(_) => Ok(()),
        }
    }

    /// A fresh, unopened source for this backend's change notifications.
    pub fn change_source(&self) -> StoreChangeSource {
        match self {
            NewsletterStore::Postgres(store) => StoreChangeSource::Postgres(store.change_source()),
            NewsletterStore::Memory(store) => StoreChangeSource::Memory(store.change_source()),
        }
    }
}

impl From<PgStore> for NewsletterStore {
    fn from(store: PgStore) -> Self {
        NewsletterStore::Postgres(store)
    }
}

impl From<MemoryStore> for NewsletterStore {
    fn from(store: MemoryStore) -> Self {
        NewsletterStore::Memory(store)
    }
}

/// Change source of either backend.
#[derive(Debug)]
pub enum StoreChangeSource {
    Postgres(PgChangeSource),
    Memory(ChannelSource),
}

impl ChangeSource for StoreChangeSource {
    async fn open(&mut self) -> Result<(), RelayError> {
        match self {
            StoreChangeSource::Postgres(source) => source.open().await,
            StoreChangeSource::Memory(source) => source.open().await,
        }
    }

    async fn next_payload(&mut self) -> Result<String, RelayError> {
        match self {
            StoreChangeSource::Postgres(source) => source.next_payload().await,
            StoreChangeSource::Memory(source) => source.next_payload().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            StoreChangeSource::Postgres(source) => source.describe(),
            StoreChangeSource::Memory(source) => source.describe(),
        }
    }
}

/// Reject bodies the store should never see.
pub fn validate(new: &NewNewsletter) -> Result<(), String> {
    if new.title.trim().is_empty() {
        return Err("title must not be empty".to_string());
    }
    Ok(())
}
