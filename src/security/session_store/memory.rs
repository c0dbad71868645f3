use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{SessionStore, StoreLookup};
use crate::security::error::StoreError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store for single-node deployments and tests.
///
/// Expired entries are invisible to readers and purged on the next write.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > now);
        if ttl.is_zero() {
            entries.remove(key);
            return Ok(());
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        debug!(ttl_secs = ttl.as_secs(), "session record stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError> {
        let entries = self.entries.read().await;
        let found = entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone());
        Ok(found.into())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemorySessionStore::new();
        store.set("alice", "refresh-1", Duration::from_secs(60)).await.unwrap();

        assert_eq!(
            store.get("alice").await.unwrap(),
            StoreLookup::Found("refresh-1".to_string())
        );
        assert_eq!(store.get("bob").await.unwrap(), StoreLookup::NotFound);
        assert!(store.exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_value() {
        let store = MemorySessionStore::new();
        store.set("alice", "first", Duration::from_secs(60)).await.unwrap();
        store.set("alice", "second", Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.get("alice").await.unwrap().value(), Some("second"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemorySessionStore::new();
        store.set("alice", "refresh", Duration::from_secs(60)).await.unwrap();
        store.delete("alice").await.unwrap();

        assert_eq!(store.get("alice").await.unwrap(), StoreLookup::NotFound);
        // Deleting a missing key is not an error.
        store.delete("alice").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_vanish_after_ttl() {
        let store = MemorySessionStore::new();
        store.set("alice", "refresh", Duration::from_secs(30)).await.unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.exists("alice").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("alice").await.unwrap(), StoreLookup::NotFound);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_removes_key() {
        let store = MemorySessionStore::new();
        store.set("alice", "refresh", Duration::from_secs(60)).await.unwrap();
        store.set("alice", "refresh", Duration::ZERO).await.unwrap();

        assert!(!store.exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let store = MemorySessionStore::new();
        let cloned = store.clone();
        cloned.set("k", "v", Duration::from_secs(5)).await.unwrap();

        assert!(store.exists("k").await.unwrap());
    }
}
