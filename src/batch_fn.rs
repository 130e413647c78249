use std::future::Future;

use crate::error::BoxError;

/// The bulk-fetch function a [`Loader`](crate::Loader) dispatches its windows through.
///
/// `load` receives the distinct keys of one window that were not served from the remote
/// cache. It may return the nodes in any order, and may omit keys: a key without a node
/// whose [`id`](crate::Node::id) matches resolves to `None`. Nodes whose id was not
/// requested are ignored. An error fails every key of the call.
pub trait BatchFn<V> {
    type Error: Into<BoxError>;

    fn load(&self, keys: &[String]) -> impl Future<Output = Result<Vec<V>, Self::Error>> + Send;
}

impl<V, F, Fut, E> BatchFn<V> for F
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<V>, E>> + Send,
    E: Into<BoxError>,
{
    type Error = E;

    fn load(&self, keys: &[String]) -> impl Future<Output = Result<Vec<V>, E>> + Send {
        self(keys.to_vec())
    }
}
