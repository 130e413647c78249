//! Namespaced TTL cache on top of a remote hash collection.
//!
//! Redis has no per-field expiration for hashes, so each field stores its own deadline:
//!
//! ```json
//! {"expireAt": 1700000000000, "payload": {"id": "1", "title": "Dune"}}
//! ```
//!
//! Deadlines are enforced lazily by [`RemoteCache::get`] and eagerly by a background
//! sweep, so an expired entry lingers for at most one sweep interval.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, Either, FutureExt as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::runtime;
use crate::store::HashStore;

pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Serialize, Deserialize)]
struct CacheEntry<T> {
    #[serde(rename = "expireAt")]
    expire_at: i64,
    payload: T,
}

/// Remote cache for one entity collection.
///
/// The sweep task is spawned by the first cache operation, or by
/// [`start_sweep`](RemoteCache::start_sweep). Dropping the cache stops it.
pub struct RemoteCache<V> {
    store: Arc<dyn HashStore>,
    namespace: String,
    sweep: Mutex<Option<BoxFuture<'static, ()>>>,
    _stop_sweep: oneshot::Sender<()>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> fmt::Debug for RemoteCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCache")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<V> RemoteCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates the cache. No runtime is needed until the first operation.
    ///
    /// Once started, the sweep runs right away, then every `default_expiration_ms`
    /// clamped to [`MIN_SWEEP_INTERVAL`]..=[`MAX_SWEEP_INTERVAL`].
    pub fn new(
        store: Arc<dyn HashStore>,
        namespace: impl Into<String>,
        default_expiration_ms: u64,
    ) -> Self {
        let namespace = namespace.into();
        let (stop_tx, stop_rx) = oneshot::channel();
        let sweep = sweep_loop::<V>(
            store.clone(),
            namespace.clone(),
            sweep_interval(default_expiration_ms),
            stop_rx,
        )
        .boxed();
        RemoteCache {
            store,
            namespace,
            sweep: Mutex::new(Some(sweep)),
            _stop_sweep: stop_tx,
            _marker: PhantomData,
        }
    }

    /// Spawns the sweep task on the current runtime unless it already runs.
    ///
    /// # Panics
    ///
    /// Panics when called outside a runtime, like the runtime's own `spawn`.
    pub fn start_sweep(&self) {
        let sweep = self
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweep) = sweep {
            runtime::spawn(sweep);
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the live payload stored under `key`.
    ///
    /// Expired or undecodable entries are deleted and reported as a miss. Only a failing
    /// store command is an error.
    pub async fn get(&self, key: &str) -> Result<Option<V>> {
        self.start_sweep();
        let Some(raw) = self.store.hget(&self.namespace, key).await? else {
            return Ok(None);
        };
        match decode::<V>(&raw, now_millis()) {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => {
                debug!(namespace = %self.namespace, key, "cache entry expired");
                self.discard(key).await;
                Ok(None)
            }
            Err(err) => {
                warn!(namespace = %self.namespace, key, error = %err, "malformed cache entry");
                self.discard(key).await;
                Ok(None)
            }
        }
    }

    /// Stores `payload` under `key` for `expiration_ms` milliseconds.
    pub async fn set(&self, key: &str, payload: &V, expiration_ms: u64) -> Result<()> {
        self.start_sweep();
        if expiration_ms == 0 {
            return Err(Error::Validation(format!(
                "expiration of cache entry `{}` must be greater than zero",
                key
            )));
        }
        let raw = {
            let ttl = i64::try_from(expiration_ms).unwrap_or(i64::MAX);
            let entry = CacheEntry {
                expire_at: now_millis().saturating_add(ttl),
                payload,
            };
            serde_json::to_string(&entry)?
        };
        self.store.hset(&self.namespace, key, raw).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.start_sweep();
        self.store
            .hdel(&self.namespace, &[key.to_string()])
            .await
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<()> {
        self.start_sweep();
        if keys.is_empty() {
            return Ok(());
        }
        self.store.hdel(&self.namespace, keys).await
    }

    /// Drops the whole namespace.
    pub async fn clear(&self) -> Result<()> {
        self.start_sweep();
        self.store.del(&self.namespace).await
    }

    /// Runs one sweep pass and returns how many entries it removed.
    pub async fn remove_expired(&self) -> Result<usize> {
        self.start_sweep();
        remove_expired::<V>(self.store.as_ref(), &self.namespace).await
    }

    async fn discard(&self, key: &str) {
        if let Err(err) = self.delete(key).await {
            warn!(namespace = %self.namespace, key, error = %err, "failed to discard cache entry");
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn sweep_interval(default_expiration_ms: u64) -> Duration {
    Duration::from_millis(default_expiration_ms).clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)
}

/// `Ok(None)` when the entry is past its deadline, `Err` when it is not a cache entry.
fn decode<V: DeserializeOwned>(raw: &str, now: i64) -> serde_json::Result<Option<V>> {
    let entry: CacheEntry<V> = serde_json::from_str(raw)?;
    if entry.expire_at <= now {
        return Ok(None);
    }
    Ok(Some(entry.payload))
}

#[instrument(skip(store), level = "debug")]
async fn remove_expired<V: DeserializeOwned>(store: &dyn HashStore, namespace: &str) -> Result<usize> {
    let entries = store.hgetall(namespace).await?;
    let now = now_millis();
    let stale: Vec<String> = entries
        .into_iter()
        .filter(|(_, raw)| !matches!(decode::<V>(raw, now), Ok(Some(_))))
        .map(|(field, _)| field)
        .collect();
    if !stale.is_empty() {
        store.hdel(namespace, &stale).await?;
    }
    Ok(stale.len())
}

async fn sweep_loop<V: DeserializeOwned>(
    store: Arc<dyn HashStore>,
    namespace: String,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        match remove_expired::<V>(store.as_ref(), &namespace).await {
            Ok(0) => {}
            Ok(removed) => debug!(%namespace, removed, "swept expired cache entries"),
            Err(err) => warn!(%namespace, error = %err, "cache sweep failed"),
        }
        let tick = runtime::sleep(interval);
        futures::pin_mut!(tick);
        if let Either::Right(_) = future::select(tick, &mut stop).await {
            debug!(%namespace, "cache sweep stopped");
            break;
        }
    }
}
