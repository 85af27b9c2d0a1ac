use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::{
    ChangeEvent, CommitReceipt, Document, DocumentPath, DocumentStore, Query, ServerClock,
    StoreError, WriteBatch, CHANGE_FEED_CAPACITY,
};

/// In-memory document store for tests and local development.
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentPath, Document>>,
    clock: ServerClock,
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            documents: RwLock::new(BTreeMap::new()),
            clock: ServerClock::default(),
            changes,
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().await;
        Ok(query.select(
            documents
                .values()
                .filter(|doc| doc.path.parent() == &query.collection)
                .cloned(),
        ))
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
        let mut documents = self.documents.write().await;
        let current: BTreeMap<DocumentPath, Document> = batch
            .paths()
            .into_iter()
            .filter_map(|path| documents.get(&path).map(|doc| (path, doc.clone())))
            .collect();
        let commit_time = self.clock.now();
        let mutations = batch.resolve(&current, commit_time)?;
        let written = mutations.len();
        for (path, fields) in mutations {
            match fields {
                Some(fields) => {
                    documents.insert(
                        path.clone(),
                        Document {
                            path,
                            fields,
                            update_time: commit_time,
                        },
                    );
                }
                None => {
                    documents.remove(&path);
                }
            }
        }
        drop(documents);

        debug!(written, %commit_time, "committed batch to memory store");
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(ChangeEvent {
            commit_time,
            collections: batch.collections().into(),
        });
        Ok(CommitReceipt {
            commit_time,
            written,
        })
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
