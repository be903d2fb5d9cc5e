//! Identity store: record types, registrar interfaces and connection.
//!
//! The hydration orchestrator only ever sees the two capability traits,
//! [`UserRegistrar`] and [`CredentialRegistrar`], so any backend (or a test
//! double) can stand in for the real store.

mod connection;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use connection::{connect, Connection};
pub use memory::MemoryStore;

/// Credential kind. Only key-auth is provisioned at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "key-auth")]
    KeyAuth,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::KeyAuth => "key-auth",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields submitted when creating a user/application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFields {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
}

impl IdentityFields {
    /// Provisioned identities carry their name in all three fields.
    pub fn from_name(name: &str) -> Self {
        Self {
            username: name.to_string(),
            firstname: name.to_string(),
            lastname: name.to_string(),
        }
    }
}

/// A stored user/application. `id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// An authentication key pair bound to an identity record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub consumer_id: String,
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub key_id: String,
    pub key_secret: String,
}

impl Credential {
    pub fn key_auth(consumer_id: &str, key_id: &str, key_secret: &str) -> Self {
        Self {
            consumer_id: consumer_id.to_string(),
            credential_type: CredentialType::KeyAuth,
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("consumer_id", &self.consumer_id)
            .field("credential_type", &self.credential_type)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .finish()
    }
}

/// Creates user/application records.
///
/// Implementations must be safe to call concurrently for distinct inputs.
#[async_trait]
pub trait UserRegistrar: Send + Sync {
    async fn insert(&self, fields: IdentityFields) -> Result<IdentityRecord, StoreError>;
}

/// Credential and scope operations.
#[async_trait]
pub trait CredentialRegistrar: Send + Sync {
    /// Attach `credential` to the identity with id `identity_id`.
    async fn insert_credential(
        &self,
        identity_id: &str,
        credential_type: CredentialType,
        credential: Credential,
    ) -> Result<(), StoreError>;

    /// Whether `scope` is already known to the store.
    async fn exists_scope(&self, scope: &str) -> Result<bool, StoreError>;

    /// Add every token in `scopes`. Callers never pass an empty slice.
    async fn insert_scopes(&self, scopes: &[String]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_serialises_with_type_tag() {
        let c = Credential::key_auth("admin", "k1", "s1");
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "key-auth");
        assert_eq!(json["consumerId"], "admin");
        assert_eq!(json["keyId"], "k1");
        assert_eq!(json["keySecret"], "s1");
    }

    #[test]
    fn credential_debug_redacts_secret() {
        let c = Credential::key_auth("admin", "k1", "hunter2");
        assert!(!format!("{c:?}").contains("hunter2"));
    }

    #[test]
    fn fields_from_name_fill_all_three() {
        let f = IdentityFields::from_name("admin");
        assert_eq!(f.username, "admin");
        assert_eq!(f.firstname, "admin");
        assert_eq!(f.lastname, "admin");
    }
}
