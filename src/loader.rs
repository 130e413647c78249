use std::collections::HashMap;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{self, FutureExt as _};
use tracing::{debug, instrument, warn};

use crate::cache::RemoteCache;
use crate::config::LoaderConfig;
use crate::duration::Expiration;
use crate::error::{Error, Result};
use crate::store::HashStore;
use crate::{runtime, BatchFn, Node};

type Resolver<V> = oneshot::Sender<Result<Option<V>>>;

enum Pending<V> {
    /// Callers waiting on the bulk fetch, and the expiration their result is cached with.
    Requested {
        expiration_ms: u64,
        waiters: Vec<Resolver<V>>,
    },
    Primed(V),
}

struct Request<V> {
    key: String,
    expiration_ms: u64,
    waiters: Vec<Resolver<V>>,
}

/// Keys collected during one coalescing cycle.
struct Batch<V> {
    /// Set exactly once, by the first caller that finishes yielding.
    closed: bool,
    keys: Vec<String>,
    pending: HashMap<String, Pending<V>>,
}

impl<V> Batch<V> {
    fn new() -> Self {
        Batch {
            closed: false,
            keys: Vec::new(),
            pending: HashMap::new(),
        }
    }

    fn accepts(&self, max_batch_size: Option<usize>) -> bool {
        !self.closed && max_batch_size.map_or(true, |max| self.keys.len() < max)
    }

    fn forget(&mut self, key: &str) {
        self.keys.retain(|k| k != key);
        self.pending.remove(key);
    }

    fn reset(&mut self) {
        self.keys.clear();
        self.pending.clear();
    }

    /// Takes the requested keys out of the window, once. Only the caller that gets
    /// `Some` dispatches them.
    fn close(&mut self) -> Option<Vec<Request<V>>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        let requests = mem::take(&mut self.keys)
            .into_iter()
            .filter_map(|key| match self.pending.remove(&key) {
                Some(Pending::Requested {
                    expiration_ms,
                    waiters,
                }) => Some(Request {
                    key,
                    expiration_ms,
                    waiters,
                }),
                Some(primed) => {
                    self.pending.insert(key, primed);
                    None
                }
                None => None,
            })
            .collect();
        Some(requests)
    }
}

struct Inner<V, F> {
    window: Mutex<Option<Arc<Mutex<Batch<V>>>>>,
    fetch: Arc<F>,
    cache: Arc<RemoteCache<V>>,
    config: LoaderConfig,
    default_expiration_ms: u64,
}

/// Coalesces `load` calls into batched [`BatchFn`] calls, memoized in a [`RemoteCache`].
///
/// Every `load`, `prime` and `clear` registers with the open window synchronously and
/// returns a future. The window closes when the first of its callers is awaited and has
/// yielded [`LoaderConfig::yield_count`] times, so every key requested before any of
/// them is awaited shares one bulk fetch. Nothing is spawned: the awaiting callers drive
/// the dispatch themselves.
pub struct Loader<V, F> {
    inner: Arc<Inner<V, F>>,
}

// Manual implementation is used to omit applying unnecessary Clone bounds.
impl<V, F> Clone for Loader<V, F> {
    fn clone(&self) -> Self {
        Loader {
            inner: self.inner.clone(),
        }
    }
}

impl<V, F> Loader<V, F>
where
    V: Node,
    F: BatchFn<V> + Send + Sync + 'static,
{
    /// Creates a loader whose cache lives in `store` under `config.cache_namespace`.
    pub fn new(fetch: F, store: Arc<dyn HashStore>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        let cache = RemoteCache::new(
            store,
            config.cache_namespace.clone(),
            config.default_expiration_ms(),
        );
        Ok(Self::build(fetch, Arc::new(cache), config))
    }

    /// Creates a loader on an existing cache. The cache's namespace wins over
    /// `config.cache_namespace`.
    pub fn with_cache(fetch: F, cache: Arc<RemoteCache<V>>, config: LoaderConfig) -> Result<Self> {
        let config = LoaderConfig {
            cache_namespace: cache.namespace().to_string(),
            ..config
        };
        config.validate()?;
        Ok(Self::build(fetch, cache, config))
    }

    fn build(fetch: F, cache: Arc<RemoteCache<V>>, config: LoaderConfig) -> Self {
        Loader {
            inner: Arc::new(Inner {
                window: Mutex::new(None),
                fetch: Arc::new(fetch),
                cache,
                default_expiration_ms: config.default_expiration_ms(),
                config,
            }),
        }
    }

    pub fn max_batch_size(&self) -> Option<usize> {
        self.inner.config.max_batch_size
    }

    pub fn namespace(&self) -> &str {
        &self.inner.config.cache_namespace
    }

    pub fn cache(&self) -> &Arc<RemoteCache<V>> {
        &self.inner.cache
    }

    /// Loads `key` with the default expiration.
    ///
    /// Resolves to `None` when the bulk fetch returned no node for the key.
    pub fn load(&self, key: impl Into<String>) -> impl Future<Output = Result<Option<V>>> + Send + 'static {
        self.enqueue(key.into(), self.inner.default_expiration_ms)
    }

    /// Loads `key`, caching the result for `expiration`. [`Expiration::NEVER`] skips the
    /// remote cache write for this call.
    pub fn load_with_expiration(
        &self,
        key: impl Into<String>,
        expiration: impl Into<Expiration>,
    ) -> impl Future<Output = Result<Option<V>>> + Send + 'static {
        self.enqueue(key.into(), expiration.into().as_millis())
    }

    /// Loads every key; one failing key does not fail the others.
    pub fn load_many<I>(&self, keys: I) -> impl Future<Output = Vec<Result<Option<V>>>> + Send + 'static
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let loads: Vec<_> = keys.into_iter().map(|key| self.load(key)).collect();
        future::join_all(loads)
    }

    pub fn reload(&self, key: impl Into<String>) -> impl Future<Output = Result<Option<V>>> + Send + 'static {
        self.reload_with_expiration(key, Expiration::Millis(self.inner.default_expiration_ms))
    }

    pub fn reload_with_expiration(
        &self,
        key: impl Into<String>,
        expiration: impl Into<Expiration>,
    ) -> impl Future<Output = Result<Option<V>>> + Send + 'static {
        let key = key.into();
        let expiration_ms = expiration.into().as_millis();
        let cleared = self.clear(key.clone());
        let loader = self.clone();
        async move {
            cleared.await?;
            loader.enqueue(key, expiration_ms).await
        }
    }

    /// Serves `value` for its id from the open window and writes it to the remote cache
    /// with the default expiration.
    ///
    /// Callers already waiting on the id in the open window get `value` too.
    pub fn prime(&self, value: V) -> impl Future<Output = Result<()>> + Send + 'static {
        self.seed(value, self.inner.default_expiration_ms)
    }

    pub fn prime_with_expiration(
        &self,
        value: V,
        expiration: impl Into<Expiration>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        self.seed(value, expiration.into().as_millis())
    }

    pub fn prime_many<I>(&self, values: I) -> impl Future<Output = Result<()>> + Send + 'static
    where
        I: IntoIterator<Item = V>,
    {
        self.prime_many_with_expiration(values, Expiration::Millis(self.inner.default_expiration_ms))
    }

    pub fn prime_many_with_expiration<I>(
        &self,
        values: I,
        expiration: impl Into<Expiration>,
    ) -> impl Future<Output = Result<()>> + Send + 'static
    where
        I: IntoIterator<Item = V>,
    {
        let expiration_ms = expiration.into().as_millis();
        let writes: Vec<_> = values
            .into_iter()
            .map(|value| self.seed(value, expiration_ms))
            .collect();
        async move {
            for write in writes {
                write.await?;
            }
            Ok::<(), Error>(())
        }
    }

    /// Drops `key` from the open window and from the remote cache.
    ///
    /// Callers still waiting on the dropped key fail with [`Error::Cleared`].
    pub fn clear(&self, key: impl Into<String>) -> impl Future<Output = Result<()>> + Send + 'static {
        let key = key.into();
        if let Some(batch) = lock(&self.inner.window).as_ref() {
            lock(batch).forget(&key);
        }
        let cache = self.inner.cache.clone();
        async move { cache.delete(&key).await }
    }

    pub fn clear_many<I>(&self, keys: I) -> impl Future<Output = Result<()>> + Send + 'static
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let clears: Vec<_> = keys.into_iter().map(|key| self.clear(key)).collect();
        async move {
            future::try_join_all(clears).await?;
            Ok::<(), Error>(())
        }
    }

    /// Empties the open window and the whole remote namespace.
    pub fn clear_all(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        if let Some(batch) = lock(&self.inner.window).as_ref() {
            lock(batch).reset();
        }
        let cache = self.inner.cache.clone();
        async move { cache.clear().await }
    }

    fn enqueue(&self, key: String, expiration_ms: u64) -> impl Future<Output = Result<Option<V>>> + Send + 'static {
        if key.is_empty() {
            return future::ready(Err::<Option<V>, _>(Error::Validation(
                "loaded key must be a non-empty string".to_string(),
            )))
            .left_future();
        }
        let (tx, rx) = oneshot::channel();
        let registered = self.with_open_batch(|window, batch| match batch.pending.get_mut(&key) {
            Some(Pending::Primed(value)) => Err(value.clone()),
            Some(Pending::Requested { waiters, .. }) => {
                waiters.push(tx);
                Ok(window.clone())
            }
            None => {
                batch.keys.push(key.clone());
                batch.pending.insert(
                    key.clone(),
                    Pending::Requested {
                        expiration_ms,
                        waiters: vec![tx],
                    },
                );
                Ok(window.clone())
            }
        });
        match registered {
            Ok(window) => wait_for(
                window,
                self.inner.fetch.clone(),
                self.inner.cache.clone(),
                self.inner.config.yield_count,
                key,
                rx,
            )
            .left_future()
            .right_future(),
            Err(primed) => future::ready(Ok::<_, Error>(Some(primed))).right_future().right_future(),
        }
    }

    fn seed(&self, value: V, expiration_ms: u64) -> impl Future<Output = Result<()>> + Send + 'static {
        if value.id().is_empty() {
            return future::ready(Err::<(), _>(Error::Validation(
                "primed value must carry a non-empty id".to_string(),
            )))
            .left_future();
        }
        let id = value.id().to_string();
        self.with_open_batch(|_, batch| {
            let previous = batch.pending.insert(id.clone(), Pending::Primed(value.clone()));
            if let Some(Pending::Requested { waiters, .. }) = previous {
                batch.keys.retain(|k| k != &id);
                resolve(waiters, Ok(Some(value.clone())));
            }
        });
        let cache = self.inner.cache.clone();
        async move {
            if expiration_ms > 0 {
                cache.set(&id, &value, expiration_ms).await?;
            }
            Ok::<(), Error>(())
        }
        .right_future()
    }

    /// Runs `f` on the open window, opening a new one when the current window is
    /// closed or full. The check and `f` happen under the same batch lock.
    fn with_open_batch<R>(&self, f: impl FnOnce(&Arc<Mutex<Batch<V>>>, &mut Batch<V>) -> R) -> R {
        let max_batch_size = self.inner.config.max_batch_size;
        let mut slot = lock(&self.inner.window);
        if let Some(window) = slot.as_ref() {
            let mut batch = lock(window);
            if batch.accepts(max_batch_size) {
                return f(window, &mut batch);
            }
        }
        let window = Arc::new(Mutex::new(Batch::new()));
        let result = f(&window, &mut lock(&window));
        *slot = Some(window);
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The future handed to one caller of `key`.
///
/// The first caller of a window to finish yielding dispatches the whole window. If that
/// future is dropped mid-dispatch, the other callers fail with [`Error::Cleared`].
async fn wait_for<V, F>(
    window: Arc<Mutex<Batch<V>>>,
    fetch: Arc<F>,
    cache: Arc<RemoteCache<V>>,
    yield_count: usize,
    key: String,
    rx: oneshot::Receiver<Result<Option<V>>>,
) -> Result<Option<V>>
where
    V: Node,
    F: BatchFn<V> + Send + Sync + 'static,
{
    // yield for other loads to join the window
    for _ in 0..yield_count {
        runtime::yield_now().await;
    }
    let requests = lock(&window).close();
    if let Some(requests) = requests {
        dispatch(requests, &*fetch, &cache).await;
    }
    match rx.await {
        Ok(result) => result,
        Err(oneshot::Canceled) => Err(Error::Cleared(key)),
    }
}

fn resolve<V: Clone>(waiters: Vec<Resolver<V>>, result: Result<Option<V>>) {
    for tx in waiters {
        // nobody is waiting when the caller dropped its future
        let _ = tx.send(result.clone());
    }
}

/// A cache hit for `key`. Store failures and entries stored under a foreign id count as
/// misses.
async fn probe<V: Node>(cache: &RemoteCache<V>, key: &str) -> Option<V> {
    match cache.get(key).await {
        Ok(Some(node)) if node.id() == key => Some(node),
        Ok(Some(node)) => {
            warn!(%key, id = node.id(), "cached node id differs from its key");
            if let Err(err) = cache.delete(key).await {
                warn!(%key, error = %err, "failed to discard cache entry");
            }
            None
        }
        Ok(None) => None,
        Err(err) => {
            warn!(%key, error = %err, "cache probe failed, falling back to fetch");
            None
        }
    }
}

#[instrument(skip_all, level = "debug", fields(namespace = cache.namespace()))]
async fn dispatch<V, F>(requests: Vec<Request<V>>, fetch: &F, cache: &RemoteCache<V>)
where
    V: Node,
    F: BatchFn<V>,
{
    if requests.is_empty() {
        return;
    }

    let hits = future::join_all(requests.iter().map(|request| probe(cache, &request.key))).await;
    let mut remaining = Vec::with_capacity(requests.len());
    for (request, hit) in requests.into_iter().zip(hits) {
        match hit {
            Some(node) => resolve(request.waiters, Ok(Some(node))),
            None => remaining.push(request),
        }
    }
    if remaining.is_empty() {
        debug!("batch served from cache");
        return;
    }

    let keys: Vec<String> = remaining.iter().map(|request| request.key.clone()).collect();
    debug!(keys = keys.len(), "fetching batch");
    match fetch.load(&keys).await.map_err(Error::fetch) {
        Ok(nodes) => {
            let mut found: HashMap<String, V> = HashMap::with_capacity(nodes.len());
            for node in nodes {
                found.entry(node.id().to_string()).or_insert(node);
            }
            for Request {
                key,
                expiration_ms,
                waiters,
            } in remaining
            {
                let node = found.remove(&key);
                if let Some(node) = node.as_ref().filter(|_| expiration_ms > 0) {
                    if let Err(err) = cache.set(&key, node, expiration_ms).await {
                        warn!(%key, error = %err, "failed to cache fetched node");
                    }
                }
                resolve(waiters, Ok(node));
            }
            if !found.is_empty() {
                debug!(ignored = found.len(), "fetch returned nodes for keys that were not requested");
            }
        }
        Err(err) => {
            warn!(keys = remaining.len(), error = %err, "batch fetch failed");
            for request in remaining {
                resolve(request.waiters, Err(err.clone()));
            }
        }
    }
}
