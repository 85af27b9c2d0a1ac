use tracing::info;

use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    layout,
    models::user::Profile,
    store::{encode, FieldChange, SharedStore, WriteBatch},
};

pub const ANONYMOUS_NAME: &str = "Anonymous User";

#[derive(Clone)]
pub struct ProfileService {
    store: SharedStore,
}

impl ProfileService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, uid: &str, name: &str, email: &str) -> Result<(), AppError> {
        let mut batch = WriteBatch::new();
        batch.set_with(
            layout::user_doc(uid)?,
            encode(&serde_json::json!({ "name": name, "email": email }))?,
            vec![FieldChange::server_timestamp("updatedAt")],
        );
        self.store.commit(batch).await?;
        Ok(())
    }

    pub async fn load(&self, uid: &str) -> Result<Option<Profile>, AppError> {
        match self.store.get(&layout::user_doc(uid)?).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Name shown to other users: profile name, then username, then a placeholder.
    pub async fn display_name(&self, user: &AuthenticatedUser) -> Result<String, AppError> {
        let profile_name = self
            .load(&user.uuid)
            .await?
            .map(|profile| profile.name.trim().to_string())
            .filter(|name| !name.is_empty());
        Ok(profile_name
            .or_else(|| Some(user.username.trim().to_string()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string()))
    }

    pub async fn save_name(&self, user: &AuthenticatedUser, name: &str) -> Result<Profile, AppError> {
        let name = name.trim();
        if name.chars().count() < 2 {
            return Err(AppError::BadRequest(
                "Name must be at least 2 characters.".into(),
            ));
        }
        let email = self
            .load(&user.uuid)
            .await?
            .map(|profile| profile.email)
            .unwrap_or_else(|| user.email.clone());
        self.create(&user.uuid, name, &email).await?;
        info!(user = %user.uuid, "profile updated");
        self.load(&user.uuid).await?.ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryDocumentStore;

    fn carol() -> AuthenticatedUser {
        AuthenticatedUser {
            id: 3,
            uuid: "carol-uuid".into(),
            username: "carol".into(),
            email: "carol@example.com".into(),
        }
    }

    #[tokio::test]
    async fn display_name_falls_back_to_username() {
        let profiles = ProfileService::new(Arc::new(MemoryDocumentStore::new()));
        let user = carol();
        assert_eq!(profiles.display_name(&user).await.unwrap(), "carol");

        profiles.save_name(&user, "Carol P").await.unwrap();
        assert_eq!(profiles.display_name(&user).await.unwrap(), "Carol P");

        let nameless = AuthenticatedUser {
            username: " ".into(),
            uuid: "ghost".into(),
            ..user
        };
        assert_eq!(profiles.display_name(&nameless).await.unwrap(), ANONYMOUS_NAME);
    }

    #[tokio::test]
    async fn short_names_are_rejected() {
        let profiles = ProfileService::new(Arc::new(MemoryDocumentStore::new()));
        assert!(matches!(
            profiles.save_name(&carol(), " C ").await,
            Err(AppError::BadRequest(_))
        ));
        let saved = profiles.save_name(&carol(), "Caro").await.unwrap();
        assert_eq!(saved.email, "carol@example.com");
        assert!(saved.updated_at.is_some());
    }
}
