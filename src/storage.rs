//! Browser storage access for credential resolution
//!
//! Recorded requests never embed live secrets. They carry references into
//! the page's own storage (localStorage, sessionStorage, cookies) and the
//! executor resolves those references at send time, so a replayed script
//! picks up whatever credentials the current session actually holds.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Browser-side key/value store consulted for credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageKind {
    LocalStorage,
    SessionStorage,
    Cookie,
}

impl StorageKind {
    /// Name as it appears in recordings and logs
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::LocalStorage => "localStorage",
            StorageKind::SessionStorage => "sessionStorage",
            StorageKind::Cookie => "cookie",
        }
    }
}

/// Read access to one page's storage.
///
/// The backend decides how a lookup reaches the live page. Implementations
/// must evaluate lazily per call: values are never cached between requests,
/// so a token rotated mid-script is picked up by the next request.
#[async_trait]
pub trait StorageAccessor: Send + Sync {
    /// Look up `key` in the given store. `None` when the key is absent.
    async fn get(&self, kind: StorageKind, key: &str) -> Result<Option<String>>;
}

/// In-memory accessor for tests and demos.
///
/// Built once, then read-only. Use [`MemoryStorage::with`] to seed entries:
///
/// ```rust
/// use replaykit::{MemoryStorage, StorageKind};
///
/// let storage = MemoryStorage::new()
///     .with(StorageKind::LocalStorage, "auth_token", "t0ken");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<StorageKind, HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one entry, builder-style
    pub fn with(
        mut self,
        kind: StorageKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.entries
            .entry(kind)
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl StorageAccessor for MemoryStorage {
    async fn get(&self, kind: StorageKind, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(&kind)
            .and_then(|store| store.get(key))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_returns_seeded_value() {
        let storage = MemoryStorage::new()
            .with(StorageKind::LocalStorage, "auth_token", "t0ken")
            .with(StorageKind::Cookie, "session", "abc123");

        let hit = storage
            .get(StorageKind::LocalStorage, "auth_token")
            .await
            .unwrap();
        assert_eq!(hit.as_deref(), Some("t0ken"));

        let cookie = storage.get(StorageKind::Cookie, "session").await.unwrap();
        assert_eq!(cookie.as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn memory_storage_misses_are_none() {
        let storage = MemoryStorage::new().with(StorageKind::LocalStorage, "auth_token", "t0ken");

        // Wrong key and wrong store are both plain misses
        assert!(storage
            .get(StorageKind::LocalStorage, "other")
            .await
            .unwrap()
            .is_none());
        assert!(storage
            .get(StorageKind::SessionStorage, "auth_token")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn storage_kind_serializes_as_camel_case() {
        let json = serde_json::to_string(&StorageKind::LocalStorage).unwrap();
        assert_eq!(json, "\"localStorage\"");

        let kind: StorageKind = serde_json::from_str("\"sessionStorage\"").unwrap();
        assert_eq!(kind, StorageKind::SessionStorage);
    }

    #[test]
    fn storage_kind_names_match_recordings() {
        assert_eq!(StorageKind::LocalStorage.name(), "localStorage");
        assert_eq!(StorageKind::SessionStorage.name(), "sessionStorage");
        assert_eq!(StorageKind::Cookie.name(), "cookie");
    }
}
