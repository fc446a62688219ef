use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::errors::StorageError;
use super::types::{CredentialStore, StoredUser};

/// Non-persistent credential store. Everything is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entry: RwLock<HashMap<String, StoredUser>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory credential store");
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn get(&self, username: &str) -> Result<Option<StoredUser>, StorageError> {
        Ok(self.entry.read().await.get(username).cloned())
    }

    async fn put(&self, user: StoredUser) -> Result<(), StorageError> {
        self.entry.write().await.insert(user.username.clone(), user);
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<bool, StorageError> {
        Ok(self.entry.write().await.remove(username).is_some())
    }

    async fn list(&self) -> Result<Vec<StoredUser>, StorageError> {
        Ok(self.entry.read().await.values().cloned().collect())
    }
}
