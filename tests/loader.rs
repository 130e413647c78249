#![cfg(feature = "runtime-tokio")]

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use redis_dataloader::{Loader, LoaderConfig, MemoryStore};
use serde_json::json;

use common::AuthorTable;

fn authors(table: &AuthorTable, store: &MemoryStore) -> Loader<common::Author, AuthorTable> {
    let config = LoaderConfig::new("authors").with_default_expiration("1h");
    Loader::new(table.clone(), Arc::new(store.clone()), config).unwrap()
}

#[tokio::test]
async fn shuffled_results_resolve_to_their_keys() {
    let table = AuthorTable::with_authors(20);
    let loader = authors(&table, &MemoryStore::new());

    let keys: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    let results = loader.load_many(keys.clone()).await;

    for (key, result) in keys.iter().zip(results) {
        assert_eq!(table.get(key), result.unwrap());
    }
    assert_eq!(1, table.batches().len());
}

#[tokio::test]
async fn clones_share_the_open_window() {
    let table = AuthorTable::with_authors(4);
    let loader = authors(&table, &MemoryStore::new());
    let other = loader.clone();

    let (a, b) = future::join(loader.load("1"), other.load("2")).await;
    assert_eq!(table.get("1"), a.unwrap());
    assert_eq!(table.get("2"), b.unwrap());
    assert_eq!(1, table.batches().len());
}

#[tokio::test]
async fn cache_outlives_the_loader() {
    let table = AuthorTable::with_authors(3);
    let store = MemoryStore::new();
    let original = table.get("1");

    {
        let loader = authors(&table, &store);
        assert_eq!(original, loader.load("1").await.unwrap());
    }
    table.rename("1", "Renamed");

    // a new process sees the cached value until it is reloaded
    let loader = authors(&table, &store);
    assert_eq!(original, loader.load("1").await.unwrap());
    let reloaded = loader.reload("1").await.unwrap().unwrap();
    assert_eq!("Renamed", reloaded.name);
    assert_eq!(2, table.batches().len());
}

#[tokio::test]
async fn nested_loads() {
    let table = AuthorTable::with_authors(10);
    let loader = authors(&table, &MemoryStore::new());

    let first = {
        let loader = loader.clone();
        async move {
            let author = loader.load("3").await.unwrap().unwrap();
            let next = (author.id.parse::<usize>().unwrap() + 1).to_string();
            loader.load_many(vec![author.id.clone(), next]).await
        }
    };
    let second = {
        let loader = loader.clone();
        async move {
            let author = loader.load("5").await.unwrap().unwrap();
            loader.load_many(vec![author.id.clone()]).await
        }
    };
    let (first, second) = future::join(first, second).await;

    assert_eq!(table.get("4"), first[1].clone().unwrap());
    assert_eq!(table.get("5"), second[0].clone().unwrap());
    // "3" and "5" share a window, later reads come from the cache
    assert_eq!(vec!["3".to_string(), "5".to_string()], table.batches()[0]);
    let fetched: HashSet<String> = table.batches().into_iter().flatten().collect();
    assert_eq!(3, fetched.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn loads_from_many_tasks() {
    let table = AuthorTable::with_authors(50);
    let loader = authors(&table, &MemoryStore::new());

    let handles: Vec<_> = (0..5)
        .map(|task| {
            let loader = loader.clone();
            tokio::spawn(async move {
                let keys: Vec<String> = (task * 10..task * 10 + 15).map(|i| i.to_string()).collect();
                let results = loader.load_many(keys.clone()).await;
                keys.into_iter().zip(results).collect::<Vec<_>>()
            })
        })
        .collect();

    let all = tokio::time::timeout(Duration::from_secs(5), future::join_all(handles))
        .await
        .expect("loads hung");
    for handle in all {
        for (key, result) in handle.unwrap() {
            assert_eq!(table.get(&key), result.unwrap());
        }
    }
    assert!(table.batches().iter().all(|batch| !batch.is_empty()));
}

#[tokio::test]
async fn json_records_are_nodes() {
    let fetch = |keys: Vec<String>| async move {
        let rows = keys
            .into_iter()
            .filter(|key| key != "ghost")
            .map(|key| json!({ "id": key, "kind": "record" }))
            .collect::<Vec<_>>();
        Ok::<_, String>(rows)
    };
    let store = MemoryStore::new();
    let config = LoaderConfig::new("records").with_default_expiration(60_000u64);
    let loader = Loader::new(fetch, Arc::new(store.clone()), config).unwrap();

    let (found, ghost) = future::join(loader.load("r1"), loader.load("ghost")).await;
    assert_eq!(Some(json!({ "id": "r1", "kind": "record" })), found.unwrap());
    assert_eq!(None, ghost.unwrap());
    assert_eq!(1, store.len("records"));

    let rejected = loader.prime(json!({ "kind": "no id" })).await;
    assert!(rejected.is_err());
}
