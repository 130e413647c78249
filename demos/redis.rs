//! Loads books through a Redis-backed loader.
//!
//! ```sh
//! REDIS_URL=redis://127.0.0.1/ cargo run --example redis
//! ```

use std::sync::Arc;

use redis_dataloader::{Loader, LoaderConfig, Node, RedisStore};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Book {
    id: String,
    title: String,
}

impl Node for Book {
    fn id(&self) -> &str {
        &self.id
    }
}

async fn fetch_books(keys: Vec<String>) -> Result<Vec<Book>, std::io::Error> {
    println!("load batch {:?}", keys);
    Ok(keys
        .into_iter()
        .filter(|id| id != "404")
        .map(|id| Book {
            title: format!("Book #{}", id),
            id,
        })
        .collect())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let client = redis::Client::open(url)?;
    let conn = client.get_multiplexed_async_connection().await?;
    let store = Arc::new(RedisStore::new(conn));

    let config = LoaderConfig::new("demo:books")
        .with_default_expiration("10m")
        .with_max_batch_size(100);
    let loader = Loader::new(fetch_books, store, config)?;

    println!("\n -- First window --");
    let results = loader.load_many(vec!["1", "2", "404"]).await;
    println!("{:?}", results);

    println!("\n -- Served from Redis --");
    println!("{:?}", loader.load("1").await?);

    loader.clear_all().await?;
    Ok(())
}
