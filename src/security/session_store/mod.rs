//! Key-value session state with per-key expiry.
//!
//! Two kinds of record live here: `identity -> refresh token` for the live
//! session of a member, and `access token -> REVOCATION_MARKER` for access
//! tokens revoked by logout. Every record's TTL is the remaining lifetime of
//! the token it shadows, so losing the store never extends a token's life.

use async_trait::async_trait;
use std::time::Duration;

use crate::security::error::StoreError;

pub mod memory;
pub mod redis;

pub use self::memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

/// Value stored under a revoked access token.
pub const REVOCATION_MARKER: &str = "logout";

/// Outcome of a successful store read. Backend failures are `Err(StoreError)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLookup {
    Found(String),
    NotFound,
}

impl StoreLookup {
    pub fn exists(&self) -> bool {
        matches!(self, StoreLookup::Found(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            StoreLookup::Found(v) => Some(v),
            StoreLookup::NotFound => None,
        }
    }

    pub fn is_revocation_marker(&self) -> bool {
        self.value() == Some(REVOCATION_MARKER)
    }
}

impl From<Option<String>> for StoreLookup {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => StoreLookup::Found(v),
            None => StoreLookup::NotFound,
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Store `value` under `key` for `ttl`. A zero TTL removes the key.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_distinguishes_absence_from_values() {
        // A stored "false" is a real value, not an absence sentinel.
        let stored = StoreLookup::Found("false".to_string());
        assert!(stored.exists());
        assert_eq!(stored.value(), Some("false"));
        assert!(!stored.is_revocation_marker());

        assert!(!StoreLookup::NotFound.exists());
        assert!(!StoreLookup::NotFound.is_revocation_marker());
    }

    #[test]
    fn test_revocation_marker_detection() {
        let lookup = StoreLookup::from(Some(REVOCATION_MARKER.to_string()));
        assert!(lookup.is_revocation_marker());
        assert_eq!(StoreLookup::from(None), StoreLookup::NotFound);
    }
}
