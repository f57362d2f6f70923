//! Storage of user records.

use crate::error::{Result, UserError};
use crate::secret::UserSecret;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Backend holding Secret-shaped user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Every record carrying the API user label.
    async fn list(&self) -> Result<Vec<UserSecret>>;

    async fn get(&self, name: &str) -> Result<UserSecret>;

    /// Stores a new record. Fails with [`UserError::UserExists`] if the name is taken.
    async fn create(&self, secret: UserSecret) -> Result<UserSecret>;

    /// Replaces an existing record.
    async fn update(&self, secret: UserSecret) -> Result<UserSecret>;
}

/// Records kept in memory, keyed by name.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    secrets: RwLock<BTreeMap<String, UserSecret>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store from a YAML list of records.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let records: Vec<UserSecret> = if yaml.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str(yaml)?
        };

        let secrets = records
            .into_iter()
            .map(|mut secret| {
                secret.normalize();
                (secret.name.clone(), secret)
            })
            .collect();

        Ok(Self {
            secrets: RwLock::new(secrets),
        })
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = tokio::fs::read_to_string(path).await?;
        let store = Self::from_yaml(&yaml)?;
        info!("Loaded {} user records from {}", store.len().await, path.display());
        Ok(store)
    }

    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn list(&self) -> Result<Vec<UserSecret>> {
        let secrets = self.secrets.read().await;
        Ok(secrets
            .values()
            .filter(|secret| secret.is_user_secret())
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> Result<UserSecret> {
        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| UserError::SecretNotFound(name.to_string()))
    }

    async fn create(&self, mut secret: UserSecret) -> Result<UserSecret> {
        let mut secrets = self.secrets.write().await;
        if secrets.contains_key(&secret.name) {
            return Err(UserError::UserExists(secret.name));
        }

        secret.normalize();
        debug!(secret = %secret.name, "user record created");
        secrets.insert(secret.name.clone(), secret.clone());
        Ok(secret)
    }

    async fn update(&self, mut secret: UserSecret) -> Result<UserSecret> {
        let mut secrets = self.secrets.write().await;
        let slot = secrets
            .get_mut(&secret.name)
            .ok_or_else(|| UserError::SecretNotFound(secret.name.clone()))?;

        secret.normalize();
        debug!(secret = %secret.name, "user record updated");
        *slot = secret.clone();
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{API_USER_LABEL, API_USER_LABEL_VALUE};

    fn user_secret(name: &str) -> UserSecret {
        let mut secret = UserSecret::new(name);
        secret
            .labels
            .insert(API_USER_LABEL.into(), API_USER_LABEL_VALUE.into());
        secret.set("username", name);
        secret
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let store = InMemoryUserStore::new();
        let created = store.create(user_secret("alice")).await.unwrap();
        assert!(created.string_data.is_empty());
        assert_eq!(created.get("username").as_deref(), Some("alice"));

        let mut secret = store.get("alice").await.unwrap();
        secret.set("namespaces", "ws1");
        store.update(secret).await.unwrap();

        let secret = store.get("alice").await.unwrap();
        assert_eq!(secret.get("namespaces").as_deref(), Some("ws1"));
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = InMemoryUserStore::new();
        store.create(user_secret("alice")).await.unwrap();
        let err = store.create(user_secret("alice")).await.unwrap_err();
        assert!(matches!(err, UserError::UserExists(_)));
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let store = InMemoryUserStore::new();
        let err = store.update(user_secret("ghost")).await.unwrap_err();
        assert!(matches!(err, UserError::SecretNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_on_label() {
        let store = InMemoryUserStore::new();
        store.create(user_secret("alice")).await.unwrap();
        store.create(UserSecret::new("unrelated")).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "alice");
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_from_yaml() {
        let yaml = r#"
- name: ruser-alice
  labels:
    paas.io/api-user-credentials: "true"
  stringData:
    username: alice
- name: ruser-bob
  labels:
    paas.io/api-user-credentials: "true"
  data:
    username: Ym9i
"#;
        let store = InMemoryUserStore::from_yaml(yaml).unwrap();
        let bob = store.get("ruser-bob").await.unwrap();
        assert_eq!(bob.get("username").as_deref(), Some("bob"));
        assert_eq!(store.list().await.unwrap().len(), 2);
    }
}
