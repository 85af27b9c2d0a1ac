use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};

use crate::{
    config::{AppConfig, DocumentBackend},
    db::DbPool,
    services::{
        notifications::NotificationService, profiles::ProfileService, requests::RequestService,
        trips::TripService,
    },
    store::{MemoryDocumentStore, SharedStore, SqliteDocumentStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub store: SharedStore,
    pub profiles: ProfileService,
    pub trips: TripService,
    pub requests: RequestService,
    pub notifications: NotificationService,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let store: SharedStore = match config.document_backend {
            DocumentBackend::Sqlite => Arc::new(SqliteDocumentStore::new(db.clone())),
            DocumentBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        };
        Self::with_store(config, db, store)
    }

    pub fn with_store(config: AppConfig, db: DbPool, store: SharedStore) -> Self {
        let digest = Sha512::digest(config.cookie_secret.as_bytes());
        let cookie_key = Key::from(&digest[..]);
        Self {
            profiles: ProfileService::new(store.clone()),
            trips: TripService::new(store.clone()),
            requests: RequestService::new(store.clone()),
            notifications: NotificationService::new(store.clone()),
            config,
            db,
            store,
            cookie_key,
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
