//! In-process identity store.
//!
//! Two modes:
//! - **emulated** ([`MemoryStore::new`]): everything lives in process memory
//!   and is discarded on exit. Used for demos and tests where no real store
//!   is available.
//! - **snapshot** ([`MemoryStore::open`]): same in-memory state, loaded from
//!   a JSON file on open and rewritten after every successful write, so a
//!   second process run sees what the first one hydrated.
//!
//! All state sits behind a single async mutex; the lock is held across the
//! snapshot write so files land in the same order as the writes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    Credential, CredentialRegistrar, CredentialType, IdentityFields, IdentityRecord,
    UserRegistrar,
};
use crate::error::StoreError;

/// Serialisable store contents.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    /// id -> record
    #[serde(default)]
    users: BTreeMap<String, IdentityRecord>,
    /// identity id -> credentials
    #[serde(default)]
    credentials: BTreeMap<String, Vec<Credential>>,
    #[serde(default)]
    scopes: BTreeSet<String>,
}

pub struct MemoryStore {
    state: Mutex<StoreState>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Emulated store: empty, never touches disk.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            snapshot: None,
        }
    }

    /// Snapshot-backed store. A missing file starts empty; it is created on
    /// the first write.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Read(format!("corrupt snapshot {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(StoreError::Read(format!(
                    "cannot read snapshot {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self {
            state: Mutex::new(state),
            snapshot: Some(path.to_path_buf()),
        })
    }

    pub fn is_emulated(&self) -> bool {
        self.snapshot.is_none()
    }

    /// Look up a record by username.
    pub async fn find_user(&self, username: &str) -> Option<IdentityRecord> {
        let state = self.state.lock().await;
        state.users.values().find(|u| u.username == username).cloned()
    }

    /// Credentials attached to `identity_id`, in insertion order.
    pub async fn credentials(&self, identity_id: &str) -> Vec<Credential> {
        let state = self.state.lock().await;
        state.credentials.get(identity_id).cloned().unwrap_or_default()
    }

    /// All known scopes, sorted.
    pub async fn scopes(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.scopes.iter().cloned().collect()
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    /// Rewrite the snapshot file, if any. Writes to a sibling temp file
    /// first and renames it over the target.
    async fn flush(&self, state: &StoreState) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StoreError::Write(format!("cannot encode snapshot: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Write(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Write(format!("cannot write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Write(format!("cannot replace {}: {e}", path.display())))?;

        debug!(path = %path.display(), "snapshot written");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRegistrar for MemoryStore {
    async fn insert(&self, fields: IdentityFields) -> Result<IdentityRecord, StoreError> {
        let mut state = self.state.lock().await;

        if state.users.values().any(|u| u.username == fields.username) {
            return Err(StoreError::Write(format!(
                "username '{}' already exists",
                fields.username
            )));
        }

        let record = IdentityRecord {
            id: uuid::Uuid::new_v4().to_string(),
            username: fields.username,
            firstname: fields.firstname,
            lastname: fields.lastname,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        state.users.insert(record.id.clone(), record.clone());

        if let Err(e) = self.flush(&state).await {
            state.users.remove(&record.id);
            return Err(e);
        }
        Ok(record)
    }
}

#[async_trait]
impl CredentialRegistrar for MemoryStore {
    async fn insert_credential(
        &self,
        identity_id: &str,
        credential_type: CredentialType,
        credential: Credential,
    ) -> Result<(), StoreError> {
        if credential.credential_type != credential_type {
            return Err(StoreError::Write(format!(
                "credential tagged '{}' submitted as '{credential_type}'",
                credential.credential_type
            )));
        }

        let mut state = self.state.lock().await;

        if !state.users.contains_key(identity_id) {
            return Err(StoreError::Write(format!("no identity with id '{identity_id}'")));
        }

        let entry = state.credentials.entry(identity_id.to_string()).or_default();
        if entry.iter().any(|c| c.credential_type == credential_type) {
            return Err(StoreError::Write(format!(
                "identity '{identity_id}' already has a {credential_type} credential"
            )));
        }
        entry.push(credential);

        if let Err(e) = self.flush(&state).await {
            if let Some(list) = state.credentials.get_mut(identity_id) {
                list.pop();
                if list.is_empty() {
                    state.credentials.remove(identity_id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn exists_scope(&self, scope: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.scopes.contains(scope))
    }

    async fn insert_scopes(&self, scopes: &[String]) -> Result<(), StoreError> {
        if scopes.is_empty() {
            return Err(StoreError::Write("no scopes to insert".into()));
        }

        let mut state = self.state.lock().await;
        let added: Vec<String> = scopes
            .iter()
            .filter(|s| state.scopes.insert((*s).clone()))
            .cloned()
            .collect();

        if let Err(e) = self.flush(&state).await {
            for s in &added {
                state.scopes.remove(s);
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn insert_assigns_id_and_rejects_duplicate_username() {
        let store = MemoryStore::new();
        let rec = store.insert(IdentityFields::from_name("admin")).await.unwrap();
        assert!(!rec.id.is_empty());
        assert_eq!(rec.username, "admin");

        let err = store.insert(IdentityFields::from_name("admin")).await.unwrap_err();
        assert!(matches!(err, StoreError::Write(msg) if msg.contains("already exists")));
        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn credential_requires_existing_identity() {
        let store = MemoryStore::new();
        let err = store
            .insert_credential("missing", CredentialType::KeyAuth, Credential::key_auth("x", "k", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
    }

    #[tokio::test]
    async fn credential_attaches_once() {
        let store = MemoryStore::new();
        let rec = store.insert(IdentityFields::from_name("admin")).await.unwrap();
        let cred = Credential::key_auth("admin", "k1", "s1");

        store
            .insert_credential(&rec.id, CredentialType::KeyAuth, cred.clone())
            .await
            .unwrap();
        assert!(store
            .insert_credential(&rec.id, CredentialType::KeyAuth, cred.clone())
            .await
            .is_err());

        assert_eq!(store.credentials(&rec.id).await, vec![cred]);
    }

    #[tokio::test]
    async fn scopes_are_a_set() {
        let store = MemoryStore::new();
        assert!(!store.exists_scope("read").await.unwrap());

        store.insert_scopes(&scopes(&["write", "read"])).await.unwrap();
        store.insert_scopes(&scopes(&["read", "admin"])).await.unwrap();

        assert!(store.exists_scope("read").await.unwrap());
        assert_eq!(store.scopes().await, scopes(&["admin", "read", "write"]));
    }

    #[tokio::test]
    async fn empty_scope_batch_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert_scopes(&[]).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.json");

        let store = MemoryStore::open(&path).await.unwrap();
        assert!(!store.is_emulated());
        let rec = store.insert(IdentityFields::from_name("admin")).await.unwrap();
        store
            .insert_credential(&rec.id, CredentialType::KeyAuth, Credential::key_auth("admin", "k1", "s1"))
            .await
            .unwrap();
        store.insert_scopes(&scopes(&["read"])).await.unwrap();
        drop(store);

        let reopened = MemoryStore::open(&path).await.unwrap();
        let found = reopened.find_user("admin").await.unwrap();
        assert_eq!(found.id, rec.id);
        assert_eq!(reopened.credentials(&rec.id).await.len(), 1);
        assert!(reopened.exists_scope("read").await.unwrap());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = MemoryStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::Read(msg) if msg.contains("corrupt")));
    }

    #[tokio::test]
    async fn emulated_store_writes_nothing() {
        let store = MemoryStore::new();
        assert!(store.is_emulated());
        store.insert_scopes(&scopes(&["read"])).await.unwrap();
    }
}
