#![allow(unused)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use drover::{Document, DocumentId, DocumentStore, UpdateWrite};
use serde_json::{json, Value};

/// In-memory document store with numeric native ids and equality filters.
/// Cloning is shallow: clones share the same data and failure switches, so
/// tests can keep a handle after handing a clone to the facade.
pub struct MemoryStore {
    collections: Arc<DashMap<(String, String), Vec<Document>>>,
    next_id: Arc<AtomicU64>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    pub users: Vec<Document>,
    pub posts: Vec<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            collections: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            users: vec![],
            posts: vec![],
        }
    }

    /// A store seeded with fake data in the `default` database: 500 users
    /// with native ids 1..=500 in `users`, and 100 posts with UUID string
    /// ids in `posts`.
    pub fn fake() -> Self {
        let mut store = MemoryStore::new();

        let users: Vec<Document> = (1..=500u64)
            .map(|n| {
                doc(json!({
                    "_id": n,
                    "name": fakeit::name::full(),
                }))
            })
            .collect();
        let posts: Vec<Document> = users
            .iter()
            .take(100)
            .map(|user| {
                doc(json!({
                    "_id": uuid::Uuid::new_v4().to_string(),
                    "user_id": user["_id"],
                    "body": fakeit::words::sentence(3),
                }))
            })
            .collect();

        store.seed("default", "users", users.clone());
        store.seed("default", "posts", posts.clone());
        store.next_id.store(1_000, Ordering::SeqCst);
        store.users = users;
        store.posts = posts;
        store
    }

    pub fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        self.collections.insert(
            (database.to_string(), collection.to_string()),
            documents,
        );
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// A snapshot of one collection's documents.
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.collections
            .get(&(database.to_string(), collection.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        MemoryStore {
            collections: self.collections.clone(),
            next_id: self.next_id.clone(),
            fail_reads: self.fail_reads.clone(),
            fail_writes: self.fail_writes.clone(),
            users: self.users.clone(),
            posts: self.posts.clone(),
        }
    }
}

/// Build a `Document` from a `json!` object literal.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(fields) => fields,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn id_matches(id: &DocumentId<u64>, value: &Value) -> bool {
    match id {
        DocumentId::Native(native) => value.as_u64() == Some(*native),
        DocumentId::Raw(raw) => value.as_str() == Some(raw.as_str()),
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn check_filter(filter: &Document) -> anyhow::Result<()> {
    if let Some(operator) = filter.keys().find(|key| key.starts_with('$')) {
        anyhow::bail!("unsupported operator: {operator}");
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type NativeId = u64;
    type Error = anyhow::Error;

    fn parse_native_id(&self, raw: &str) -> Option<u64> {
        raw.parse().ok()
    }

    async fn find_by_ids(
        &self,
        database: &str,
        collection: &str,
        ids: &[DocumentId<u64>],
    ) -> anyhow::Result<Vec<Document>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("reads are failing");
        }

        Ok(self
            .documents(database, collection)
            .into_iter()
            .filter(|document| {
                document
                    .get("_id")
                    .is_some_and(|value| ids.iter().any(|id| id_matches(id, value)))
            })
            .collect())
    }

    async fn find_page(
        &self,
        database: &str,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: u64,
    ) -> anyhow::Result<Vec<Document>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("reads are failing");
        }
        check_filter(filter)?;

        Ok(self
            .documents(database, collection)
            .into_iter()
            .filter(|document| matches_filter(document, filter))
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count(
        &self,
        database: &str,
        collection: &str,
        filter: &Document,
    ) -> anyhow::Result<u64> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("reads are failing");
        }
        check_filter(filter)?;

        let count = self
            .documents(database, collection)
            .iter()
            .filter(|document| matches_filter(document, filter))
            .count();
        Ok(count as u64)
    }

    async fn insert_bulk(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> anyhow::Result<Vec<u64>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("writes are failing");
        }

        let mut ids = Vec::with_capacity(documents.len());
        let mut entry = self
            .collections
            .entry((database.to_string(), collection.to_string()))
            .or_default();
        for mut document in documents {
            let id = match document.get("_id").and_then(Value::as_u64) {
                Some(existing) => existing,
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    document.insert("_id".to_string(), json!(id));
                    id
                }
            };
            entry.push(document);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_bulk(
        &self,
        database: &str,
        collection: &str,
        writes: Vec<UpdateWrite<u64>>,
    ) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("writes are failing");
        }

        let key = (database.to_string(), collection.to_string());
        if let Some(mut entry) = self.collections.get_mut(&key) {
            for write in writes {
                // updateOne semantics: touch the first match only
                for document in entry.iter_mut() {
                    let matched = document
                        .get("_id")
                        .is_some_and(|value| id_matches(&write.id, value));
                    if matched {
                        for (field, value) in &write.update {
                            document.insert(field.clone(), value.clone());
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
