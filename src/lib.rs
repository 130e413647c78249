//! Batching DataLoader backed by a shared, TTL-expiring Redis cache.
//!
//! A [`Loader`] collects the keys requested while the current task runs, resolves them
//! with one call to a [`BatchFn`], and remembers the results in a [`RemoteCache`] so
//! other processes and later windows skip the fetch until the entries expire.

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
compile_error!("enable one of the `runtime-tokio` or `runtime-async-std` features");

mod batch_fn;
pub mod cache;
mod config;
pub mod duration;
mod error;
mod loader;
mod runtime;
pub mod store;

#[cfg(all(test, feature = "runtime-tokio"))]
mod tests;

pub use batch_fn::BatchFn;
pub use cache::RemoteCache;
pub use config::LoaderConfig;
pub use duration::Expiration;
pub use error::{BoxError, Error, Result};
pub use loader::Loader;
pub use store::{HashStore, MemoryStore, RedisStore};

use serde::{de::DeserializeOwned, Serialize};

/// A value a [`Loader`] can fetch and cache.
///
/// `id` must be stable and equal to the key the node is loaded by.
pub trait Node: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// Loosely typed records, identified by their `"id"` string field.
impl Node for serde_json::Value {
    fn id(&self) -> &str {
        self.get("id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}
