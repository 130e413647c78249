//! The remote hash-collection seam the cache is written against.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Hash-collection primitives of an already connected key-value store.
///
/// `namespace` names the hash, `field` an entry inside it.
#[async_trait]
pub trait HashStore: Send + Sync {
    async fn hgetall(&self, namespace: &str) -> Result<HashMap<String, String>>;

    async fn hget(&self, namespace: &str, field: &str) -> Result<Option<String>>;

    async fn hset(&self, namespace: &str, field: &str, value: String) -> Result<()>;

    /// Removes `fields`. Callers never pass an empty slice.
    async fn hdel(&self, namespace: &str, fields: &[String]) -> Result<()>;

    async fn del(&self, namespace: &str) -> Result<()>;
}
