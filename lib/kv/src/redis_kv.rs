//! Redis-backed key-value store.

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use guildhall_core::Result;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::instrument;

use crate::{KvError, KvStore};

/// [`KvStore`] backed by Redis.
///
/// Values are written with `SET key value PX ttl`, so expiry is enforced by
/// Redis itself and survives process restarts.
#[derive(Clone)]
pub struct RedisKv {
    pool: Pool,
}

impl RedisKv {
    /// Creates a pooled client for the Redis server at `url`.
    ///
    /// Connections are opened lazily; an unreachable server surfaces as
    /// [`KvError::Unavailable`] on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or pool configuration is invalid.
    pub fn connect(url: &str, pool_max: usize) -> Result<Self, KvError> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(PoolConfig::new(pool_max));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| KvError::Unavailable {
                details: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection, KvError> {
        let conn = self.pool.get().await.map_err(|e| KvError::Unavailable {
            details: e.to_string(),
        })?;
        Ok(conn)
    }
}

#[async_trait]
impl KvStore for RedisKv {
    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(KvError::InvalidTtl.into());
        }

        let mut conn = self.connection().await?;
        conn.pset_ex::<_, _, ()>(key, value, millis)
            .await
            .map_err(|e| KvError::Command {
                command: "SET",
                details: e.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await.map_err(|e| KvError::Command {
            command: "GET",
            details: e.to_string(),
        })?;
        Ok(value)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await.map_err(|e| KvError::Command {
            command: "DEL",
            details: e.to_string(),
        })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get_del(key).await.map_err(|e| KvError::Command {
            command: "GETDEL",
            details: e.to_string(),
        })?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_rejected() {
        let result = RedisKv::connect("not a url", 4);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_reports_unavailable() {
        // Port 1 is reserved and refuses connections on any sane host.
        let kv = RedisKv::connect("redis://127.0.0.1:1", 1).expect("valid config");
        let result = kv.get("sessions:whatever").await;
        let err = result.expect_err("no server listening");
        assert!(err.to_string().contains("unavailable"));
    }
}
