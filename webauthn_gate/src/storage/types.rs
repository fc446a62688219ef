use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;

use super::errors::StorageError;

/// A user record as held by a [`CredentialStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    /// WebAuthn user handle, random and never reused.
    pub id: Uuid,
    pub username: String,
    /// User attributes extracted from the registration request.
    pub attributes: BTreeMap<String, String>,
    pub credentials: Vec<Passkey>,
    /// Set once the first credential has been verified.
    pub registered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    pub fn new(username: impl Into<String>, attributes: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            attributes,
            credentials: Vec::new(),
            registered: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn display_name(&self) -> &str {
        self.attributes
            .get(crate::config::DISPLAY_NAME_ATTRIBUTE)
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or(self.username.as_str())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Public view of a user, without key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub attributes: BTreeMap<String, String>,
    pub credential_count: usize,
    pub registered: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&StoredUser> for UserSummary {
    fn from(user: &StoredUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            attributes: user.attributes.clone(),
            credential_count: user.credentials.len(),
            registered: user.registered,
            created_at: user.created_at,
        }
    }
}

/// Pluggable storage for user records and their credentials, keyed by username.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Initialize the store. This is called once when the gate is created.
    async fn init(&self) -> Result<(), StorageError>;

    /// Fetch a user by username.
    async fn get(&self, username: &str) -> Result<Option<StoredUser>, StorageError>;

    /// Insert or replace a user.
    async fn put(&self, user: StoredUser) -> Result<(), StorageError>;

    /// Remove a user. Returns whether a record existed.
    async fn delete(&self, username: &str) -> Result<bool, StorageError>;

    /// All users, in no particular order.
    async fn list(&self) -> Result<Vec<StoredUser>, StorageError>;
}
