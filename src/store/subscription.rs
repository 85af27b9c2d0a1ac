use std::marker::PhantomData;

use futures_util::{stream, Stream};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::{decode_all, ChangeEvent, Document, Query, SharedStore, StoreError};

pub struct Subscription {
    store: SharedStore,
    query: Query,
    changes: broadcast::Receiver<ChangeEvent>,
    primed: bool,
}

impl Subscription {
    pub(super) fn new(store: SharedStore, query: Query) -> Self {
        // Subscribe before the first read so no commit can slip in between.
        let changes = store.changes();
        Self {
            store,
            query,
            changes,
            primed: false,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Next result set, or `None` once the store is gone.
    pub async fn next(&mut self) -> Result<Option<Vec<Document>>, StoreError> {
        if !self.primed {
            self.primed = true;
            return self.store.query(&self.query).await.map(Some);
        }
        loop {
            match self.changes.recv().await {
                Ok(event) if event.touches(&self.query.collection) => {
                    return self.store.query(&self.query).await.map(Some);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped,
                        collection = %self.query.collection,
                        "subscription lagged, re-reading"
                    );
                    return self.store.query(&self.query).await.map(Some);
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    pub fn typed<T: DeserializeOwned>(self) -> TypedSubscription<T> {
        TypedSubscription {
            inner: self,
            _record: PhantomData,
        }
    }
}

/// A [`Subscription`] whose result sets are decoded into records.
pub struct TypedSubscription<T> {
    inner: Subscription,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    pub async fn next(&mut self) -> Result<Option<Vec<T>>, StoreError> {
        match self.inner.next().await? {
            Some(documents) => decode_all(&documents).map(Some),
            None => Ok(None),
        }
    }

    /// Stream of result sets; ends after the first error or when the store closes.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>, StoreError>> {
        stream::unfold(Some(self), |state| async move {
            let mut subscription = state?;
            match subscription.next().await {
                Ok(Some(records)) => Some((Ok(records), Some(subscription))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}
