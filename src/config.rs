use serde::{Deserialize, Serialize};

use crate::duration::Expiration;
use crate::error::{Error, Result};

/// Settings of one [`Loader`](crate::Loader).
///
/// ```
/// use redis_dataloader::LoaderConfig;
///
/// let config = LoaderConfig::from_toml_str(r#"
///     cache_namespace = "books"
///     default_expiration = "12 days"
///     max_batch_size = 100
/// "#).unwrap();
/// assert_eq!(config.default_expiration_ms(), 12 * 86_400_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Name of the remote hash holding this collection. Must be unique per entity type.
    pub cache_namespace: String,
    /// Lifetime of cached results when a call gives none. `0` disables caching.
    pub default_expiration: Expiration,
    /// Most keys a single window may hold. Unbounded when `None`.
    pub max_batch_size: Option<usize>,
    /// How many times the scheduler yields before it closes a window.
    pub yield_count: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            cache_namespace: String::new(),
            default_expiration: Expiration::NEVER,
            max_batch_size: None,
            yield_count: 10,
        }
    }
}

impl LoaderConfig {
    pub fn new(cache_namespace: impl Into<String>) -> Self {
        LoaderConfig {
            cache_namespace: cache_namespace.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: LoaderConfig =
            toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_default_expiration(mut self, expiration: impl Into<Expiration>) -> Self {
        self.default_expiration = expiration.into();
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    pub fn with_yield_count(mut self, yield_count: usize) -> Self {
        self.yield_count = yield_count;
        self
    }

    pub fn default_expiration_ms(&self) -> u64 {
        self.default_expiration.as_millis()
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_namespace.is_empty() {
            return Err(Error::Validation(
                "cache_namespace must not be empty".to_string(),
            ));
        }
        if self.max_batch_size == Some(0) {
            return Err(Error::Validation(
                "max_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
