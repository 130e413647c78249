#![cfg(feature = "runtime-tokio")]

use redis_dataloader::{HashStore, MemoryStore};

#[tokio::test]
async fn memory_store_behaves_like_a_redis_hash() {
    let store = MemoryStore::new();
    let shared = store.clone();

    store.hset("books", "1", "one".to_string()).await.unwrap();
    store.hset("books", "2", "two".to_string()).await.unwrap();
    store.hset("authors", "1", "ann".to_string()).await.unwrap();

    assert_eq!(Some("one".to_string()), shared.hget("books", "1").await.unwrap());
    assert_eq!(None, shared.hget("books", "3").await.unwrap());
    assert_eq!(2, shared.hgetall("books").await.unwrap().len());

    store
        .hdel("books", &["1".to_string(), "3".to_string()])
        .await
        .unwrap();
    assert_eq!(1, store.len("books"));

    store.del("books").await.unwrap();
    assert!(store.is_empty("books"));
    assert!(store.hgetall("books").await.unwrap().is_empty());
    assert_eq!(1, store.len("authors"));
}
