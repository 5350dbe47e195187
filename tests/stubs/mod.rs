#![allow(unused)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drover::{Document, DocumentId, DocumentStore, UpdateWrite};

/// Wraps a `DocumentStore`, recording the arguments of every primitive call
/// so tests can assert how many store round trips a batch produced and what
/// each one carried.
pub struct ObserveStore<S>
where
    S: DocumentStore,
{
    store: Arc<S>,
    fetches: Arc<Mutex<Vec<Vec<DocumentId<S::NativeId>>>>>,
    page_queries: Arc<Mutex<Vec<(Document, u64, u64)>>>,
    count_filters: Arc<Mutex<Vec<Document>>>,
    insert_batches: Arc<Mutex<Vec<usize>>>,
    update_batches: Arc<Mutex<Vec<Vec<UpdateWrite<S::NativeId>>>>>,
}

impl<S> ObserveStore<S>
where
    S: DocumentStore,
{
    pub fn new(store: S) -> Self {
        ObserveStore {
            store: Arc::new(store),
            fetches: Default::default(),
            page_queries: Default::default(),
            count_filters: Default::default(),
            insert_batches: Default::default(),
            update_batches: Default::default(),
        }
    }

    /// Number of multi-id fetches the store received.
    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    /// Number of multi-id fetches that included `id`.
    pub fn fetches_for_id(&self, id: &DocumentId<S::NativeId>) -> usize
    where
        S::NativeId: PartialEq,
    {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|batch| batch.contains(id))
            .count()
    }

    /// The id batches handed to each multi-id fetch, in call order.
    pub fn fetched_ids(&self) -> Vec<Vec<DocumentId<S::NativeId>>> {
        self.fetches.lock().unwrap().clone()
    }

    /// The (filter, skip, limit) arguments of each page query, in call
    /// order.
    pub fn page_queries(&self) -> Vec<(Document, u64, u64)> {
        self.page_queries.lock().unwrap().clone()
    }

    /// The filters handed to each count, in call order. Note that paginated
    /// queries count their totals through the same primitive.
    pub fn count_filters(&self) -> Vec<Document> {
        self.count_filters.lock().unwrap().clone()
    }

    /// The size of each bulk insert, in call order.
    pub fn insert_batches(&self) -> Vec<usize> {
        self.insert_batches.lock().unwrap().clone()
    }

    /// The writes handed to each bulk update, in call order.
    pub fn update_batches(&self) -> Vec<Vec<UpdateWrite<S::NativeId>>> {
        self.update_batches.lock().unwrap().clone()
    }
}

impl<S> Clone for ObserveStore<S>
where
    S: DocumentStore,
{
    fn clone(&self) -> Self {
        ObserveStore {
            store: self.store.clone(),
            fetches: self.fetches.clone(),
            page_queries: self.page_queries.clone(),
            count_filters: self.count_filters.clone(),
            insert_batches: self.insert_batches.clone(),
            update_batches: self.update_batches.clone(),
        }
    }
}

#[async_trait]
impl<S> DocumentStore for ObserveStore<S>
where
    S: DocumentStore,
{
    type NativeId = S::NativeId;
    type Error = S::Error;

    fn parse_native_id(&self, raw: &str) -> Option<S::NativeId> {
        self.store.parse_native_id(raw)
    }

    async fn find_by_ids(
        &self,
        database: &str,
        collection: &str,
        ids: &[DocumentId<S::NativeId>],
    ) -> Result<Vec<Document>, S::Error> {
        self.fetches.lock().unwrap().push(ids.to_vec());
        self.store.find_by_ids(database, collection, ids).await
    }

    async fn find_page(
        &self,
        database: &str,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, S::Error> {
        self.page_queries
            .lock()
            .unwrap()
            .push((filter.clone(), skip, limit));
        self.store
            .find_page(database, collection, filter, skip, limit)
            .await
    }

    async fn count(
        &self,
        database: &str,
        collection: &str,
        filter: &Document,
    ) -> Result<u64, S::Error> {
        self.count_filters.lock().unwrap().push(filter.clone());
        self.store.count(database, collection, filter).await
    }

    async fn insert_bulk(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<S::NativeId>, S::Error> {
        self.insert_batches.lock().unwrap().push(documents.len());
        self.store.insert_bulk(database, collection, documents).await
    }

    async fn update_bulk(
        &self,
        database: &str,
        collection: &str,
        writes: Vec<UpdateWrite<S::NativeId>>,
    ) -> Result<(), S::Error> {
        self.update_batches.lock().unwrap().push(writes.clone());
        self.store.update_bulk(database, collection, writes).await
    }
}
