use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error produced by a [`BatchFn`](crate::BatchFn).
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors surfaced by the loader and the remote cache.
///
/// Every variant is cheap to clone so one failure can be handed to all the callers
/// sharing a pending future.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A call argument was rejected before any work was scheduled.
    #[error("validation error: {0}")]
    Validation(String),

    /// The bulk-fetch function failed for the batch this key was part of.
    #[error("batch fetch failed: {0}")]
    Fetch(Arc<dyn StdError + Send + Sync>),

    /// The key was removed from its window before the window was dispatched, or the
    /// caller dispatching the window dropped its future.
    #[error("key `{0}` was dropped from its batch before it resolved")]
    Cleared(String),

    /// The remote hash store could not complete a command.
    #[error("store error: {0}")]
    Store(Arc<dyn StdError + Send + Sync>),

    #[error("serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn fetch(err: impl Into<BoxError>) -> Self {
        Error::Fetch(Arc::from(err.into()))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Store(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
