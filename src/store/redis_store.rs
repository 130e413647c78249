use std::collections::HashMap;

use async_trait::async_trait;
use redis::{aio::ConnectionLike, AsyncCommands};

use super::HashStore;
use crate::error::Result;

/// [`HashStore`] backed by a Redis async connection.
///
/// Any cloneable connection works, typically a `MultiplexedConnection` or a
/// `ConnectionManager`. Each command runs on a clone of the handle, so the store can be
/// shared freely.
#[derive(Clone)]
pub struct RedisStore<C> {
    conn: C,
}

impl<C> RedisStore<C> {
    pub fn new(conn: C) -> Self {
        RedisStore { conn }
    }
}

#[async_trait]
impl<C> HashStore for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn hgetall(&self, namespace: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(namespace).await?)
    }

    async fn hget(&self, namespace: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(namespace, field).await?)
    }

    async fn hset(&self, namespace: &str, field: &str, value: String) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(namespace, field, value).await?;
        Ok(())
    }

    async fn hdel(&self, namespace: &str, fields: &[String]) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(namespace, fields).await?;
        Ok(())
    }

    async fn del(&self, namespace: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(namespace).await?;
        Ok(())
    }
}
