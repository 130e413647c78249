#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use fake::faker::name::en::Name;
use fake::Fake;
use rand::seq::SliceRandom;
use redis_dataloader::{BatchFn, Node};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Node for Author {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A fake author table. Answers in random order and remembers every batch.
#[derive(Clone, Default)]
pub struct AuthorTable {
    rows: Arc<Mutex<HashMap<String, Author>>>,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl AuthorTable {
    pub fn with_authors(count: usize) -> Self {
        let table = AuthorTable::default();
        {
            let mut rows = table.rows.lock().unwrap();
            for i in 0..count {
                let id = i.to_string();
                rows.insert(
                    id.clone(),
                    Author {
                        id,
                        name: Name().fake(),
                    },
                );
            }
        }
        table
    }

    pub fn get(&self, id: &str) -> Option<Author> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn rename(&self, id: &str, name: &str) {
        if let Some(author) = self.rows.lock().unwrap().get_mut(id) {
            author.name = name.to_string();
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl BatchFn<Author> for AuthorTable {
    type Error = String;

    fn load(&self, keys: &[String]) -> impl Future<Output = Result<Vec<Author>, String>> + Send {
        self.batches.lock().unwrap().push(keys.to_vec());
        let mut found: Vec<Author> = {
            let rows = self.rows.lock().unwrap();
            keys.iter().filter_map(|key| rows.get(key).cloned()).collect()
        };
        found.shuffle(&mut rand::thread_rng());
        async move {
            tokio::task::yield_now().await;
            Ok::<_, String>(found)
        }
    }
}
