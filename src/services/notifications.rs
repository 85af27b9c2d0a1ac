use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    layout,
    models::notification::Notification,
    store::{decode_all, Direction, Query, SharedStore},
};

#[derive(Clone)]
pub struct NotificationService {
    store: SharedStore,
}

impl NotificationService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Resolution notices addressed to `user`, newest first.
    pub async fn list(&self, user: &AuthenticatedUser) -> Result<Vec<Notification>, AppError> {
        let query = Query::new(layout::notifications(&user.uuid)?)
            .order_by("timestamp", Direction::Descending);
        let documents = self.store.query(&query).await?;
        Ok(decode_all(&documents)?)
    }
}
