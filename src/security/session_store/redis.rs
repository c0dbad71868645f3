use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{SessionStore, StoreLookup};
use crate::security::error::StoreError;

/// Redis-backed store. Expiry is delegated to Redis (`SET .. PX`).
#[derive(Clone)]
pub struct RedisSessionStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionStore")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisSessionStore {
    /// Open a managed (auto-reconnecting) connection to `url`.
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)?;
        let manager = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))??;
        info!("connected to redis session store");
        Ok(Self {
            manager,
            op_timeout,
        })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(op, error = %err, "redis command failed");
                Err(err.into())
            }
            Err(_) => {
                warn!(op, timeout_ms = self.op_timeout.as_millis() as u64, "redis command timed out");
                Err(StoreError::Timeout(self.op_timeout))
            }
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return self.delete(key).await;
        }
        // PX rather than EX: whole-second rounding could outlive the shadowed token.
        let millis = ttl.as_millis().max(1) as u64;
        let mut conn = self.manager.clone();
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(millis);
        self.bounded("set", async move {
            let _: () = cmd.query_async(&mut conn).await?;
            Ok::<(), ::redis::RedisError>(())
        })
        .await?;
        debug!(ttl_ms = millis, "session record stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<StoreLookup, StoreError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        let value: Option<String> = self
            .bounded("get", async move { conn.get(key).await })
            .await?;
        Ok(value.into())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let key = key.to_string();
        self.bounded("del", async move {
            let _: () = conn.del(key).await?;
            Ok::<(), ::redis::RedisError>(())
        })
        .await
    }
}
