use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::HashStore;
use crate::error::Result;

type Collections = HashMap<String, HashMap<String, String>>;

/// In-process [`HashStore`].
///
/// Clones share the same collections, which makes it a stand-in for one Redis server
/// seen by several loaders.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields currently stored under `namespace`.
    pub fn len(&self, namespace: &str) -> usize {
        self.lock().get(namespace).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HashStore for MemoryStore {
    async fn hgetall(&self, namespace: &str) -> Result<HashMap<String, String>> {
        Ok(self.lock().get(namespace).cloned().unwrap_or_default())
    }

    async fn hget(&self, namespace: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .get(namespace)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn hset(&self, namespace: &str, field: &str, value: String) -> Result<()> {
        self.lock()
            .entry(namespace.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hdel(&self, namespace: &str, fields: &[String]) -> Result<()> {
        let mut collections = self.lock();
        if let Some(entries) = collections.get_mut(namespace) {
            for field in fields {
                entries.remove(field);
            }
            if entries.is_empty() {
                collections.remove(namespace);
            }
        }
        Ok(())
    }

    async fn del(&self, namespace: &str) -> Result<()> {
        self.lock().remove(namespace);
        Ok(())
    }
}
