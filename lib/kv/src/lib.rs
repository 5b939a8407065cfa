//! Key-value storage with per-key expiry.
//!
//! Sessions and OAuth states live outside the process in a store that
//! provides atomic per-key set, get, delete and take plus TTL expiry. The core
//! never needs anything stronger: no compare-and-swap, no multi-key
//! transactions. This crate defines that contract as [`KvStore`] and ships
//! two backends:
//! - [`MemoryKv`]: process-local, for development and tests
//! - [`RedisKv`]: Redis via a `deadpool-redis` connection pool
//!
//! # Lifecycle
//!
//! A backend is constructed once at process start, wrapped in an
//! `Arc<dyn KvStore>` and handed to every component that needs it. Dropping
//! the last handle closes the backend (the Redis pool drains its
//! connections on drop).

pub mod error;
pub mod memory;
pub mod redis_kv;

pub use error::KvError;
pub use memory::MemoryKv;
pub use redis_kv::RedisKv;

use async_trait::async_trait;
use guildhall_core::Result;
use std::time::Duration;

/// A durable key-value store with per-key time-to-live.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value, expiring
    /// after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ttl` is zero or the backend fails.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;

    /// Returns the value stored under `key`, or `None` if it is absent or
    /// has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Removes `key`. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Removes `key` and returns the value it held, as one atomic step.
    ///
    /// Of any number of concurrent takes of the same key, at most one
    /// observes the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
}
