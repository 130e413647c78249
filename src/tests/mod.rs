use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future;
use serde::{Deserialize, Serialize};

use crate::{BatchFn, LoaderConfig, Node};


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
}

impl Node for Book {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn book(id: &str, title: &str) -> Book {
    Book {
        id: id.to_string(),
        title: title.to_string(),
    }
}

/// Records every batch it is called with and answers with one `Book` per key, except
/// for keys marked missing.
#[derive(Clone, Default)]
pub struct Batcher {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    missing: Arc<Mutex<HashSet<String>>>,
    failing: Arc<AtomicBool>,
}

impl Batcher {
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_missing(&self, key: &str) {
        self.missing.lock().unwrap().insert(key.to_string());
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl BatchFn<Book> for Batcher {
    type Error = String;

    fn load(&self, keys: &[String]) -> impl Future<Output = Result<Vec<Book>, String>> + Send {
        self.calls.lock().unwrap().push(keys.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return future::ready(Err("boom".to_string()));
        }
        let missing = self.missing.lock().unwrap();
        let books: Vec<Book> = keys
            .iter()
            .filter(|key| !missing.contains(*key))
            .map(|key| book(key, &format!("title of {}", key)))
            .collect();
        future::ready(Ok(books))
    }
}

pub fn config(namespace: &str) -> LoaderConfig {
    LoaderConfig::new(namespace)
}
