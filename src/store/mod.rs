//! Namespaced JSON document store.
//!
//! Documents live in hierarchical collections (`users/{uid}/requests/{id}`).
//! All mutation goes through [`WriteBatch`], which a backend commits atomically
//! under a single commit time. Readers either query point-in-time or follow a
//! [`Subscription`] that re-runs its query whenever a commit touches the
//! collection.

mod clock;
mod document;
pub mod memory;
mod path;
mod query;
pub mod sqlite;
mod subscription;
mod write;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;

pub use clock::ServerClock;
pub use document::{decode_all, encode, Document, Fields};
pub use memory::MemoryDocumentStore;
pub use path::{CollectionPath, DocumentPath};
pub use query::{Direction, Filter, OrderBy, Query};
pub use sqlite::SqliteDocumentStore;
pub use subscription::{Subscription, TypedSubscription};
pub use write::{FieldChange, FieldTransform, Mutation, Precondition, Write, WriteBatch, WriteKind};

/// Capacity of the change feed shared by all subscribers of one store.
pub const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document changed concurrently: {0}")]
    Conflict(String),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

/// Emitted once per committed batch.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub commit_time: DateTime<Utc>,
    pub collections: Arc<[CollectionPath]>,
}

impl ChangeEvent {
    pub fn touches(&self, collection: &CollectionPath) -> bool {
        self.collections.iter().any(|c| c == collection)
    }
}

#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub commit_time: DateTime<Utc>,
    pub written: usize,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Commits every write of the batch or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError>;

    /// Feed of committed changes. Receivers only see commits made after they subscribe.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Live view over `query`: yields the current result set first, then again
/// after each commit that touches the queried collection.
pub fn subscribe(store: SharedStore, query: Query) -> Subscription {
    Subscription::new(store, query)
}
