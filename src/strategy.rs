use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;

use futures::future;

use crate::cache::LoadCache;
use crate::dispatcher::Strategy;
use crate::query::{has_non_empty_field, FindQuery, Page, UpdatePayload};
use crate::store::{id_string, DocumentStore, UpdateWrite};
use crate::{BatchError, Document};

fn store_error(error: impl Display) -> BatchError {
    BatchError::Store(error.to_string())
}

/// Batched single-document loads. The whole batch becomes one multi-id
/// lookup; results are distributed by id string and absent ids resolve to
/// `None`. A store failure rejects every id in the batch and evicts their
/// cache entries so later loads retry.
pub(crate) struct LoadDocuments<S: DocumentStore> {
    store: Arc<S>,
    database: String,
    collection: String,
    cache: LoadCache,
}

impl<S: DocumentStore> LoadDocuments<S> {
    pub(crate) fn new(
        store: Arc<S>,
        database: String,
        collection: String,
        cache: LoadCache,
    ) -> Self {
        LoadDocuments {
            store,
            database,
            collection,
            cache,
        }
    }
}

impl<S: DocumentStore> Strategy for LoadDocuments<S> {
    type Request = String;
    type Response = Option<Document>;

    async fn dispatch(&self, ids: Vec<String>) -> Vec<Result<Option<Document>, BatchError>> {
        // The cache coalesces repeats, but an id cleared mid-window can be
        // submitted twice; the store only needs it once.
        let mut seen = HashSet::new();
        let id_filters: Vec<_> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .map(|id| self.store.normalize_id(id))
            .collect();

        match self
            .store
            .find_by_ids(&self.database, &self.collection, &id_filters)
            .await
        {
            Ok(documents) => {
                let mut found = HashMap::with_capacity(documents.len());
                for document in documents {
                    if let Some(id) = document.get("_id") {
                        let key = id_string(id);
                        found.insert(key, document);
                    }
                }
                ids.iter().map(|id| Ok(found.get(id).cloned())).collect()
            }
            Err(error) => {
                // A failed batch is not cached; later loads for these ids retry
                for id in &ids {
                    self.cache.remove(id);
                }
                let error = store_error(error);
                ids.iter().map(|_| Err(error.clone())).collect()
            }
        }
    }
}

/// Batched paginated queries. Each query in the batch runs on its own,
/// concurrently with the rest; a failing query rejects only its own caller.
pub(crate) struct FindDocuments<S: DocumentStore> {
    store: Arc<S>,
    database: String,
    collection: String,
}

impl<S: DocumentStore> FindDocuments<S> {
    pub(crate) fn new(store: Arc<S>, database: String, collection: String) -> Self {
        FindDocuments {
            store,
            database,
            collection,
        }
    }

    async fn run(&self, query: FindQuery) -> Result<Page, BatchError> {
        let list = self
            .store
            .find_page(
                &self.database,
                &self.collection,
                &query.filter,
                query.skip(),
                query.limit,
            )
            .await
            .map_err(store_error)?;
        let total = self
            .store
            .count(&self.database, &self.collection, &query.filter)
            .await
            .map_err(store_error)?;

        Ok(Page {
            list,
            total,
            page: query.page,
            limit: query.limit,
        })
    }
}

impl<S: DocumentStore> Strategy for FindDocuments<S> {
    type Request = FindQuery;
    type Response = Page;

    async fn dispatch(&self, queries: Vec<FindQuery>) -> Vec<Result<Page, BatchError>> {
        future::join_all(queries.into_iter().map(|query| self.run(query))).await
    }
}

/// Batched counts. Like [`FindDocuments`], every filter counts on its own
/// and failures stay per-caller.
pub(crate) struct CountDocuments<S: DocumentStore> {
    store: Arc<S>,
    database: String,
    collection: String,
}

impl<S: DocumentStore> CountDocuments<S> {
    pub(crate) fn new(store: Arc<S>, database: String, collection: String) -> Self {
        CountDocuments {
            store,
            database,
            collection,
        }
    }
}

impl<S: DocumentStore> Strategy for CountDocuments<S> {
    type Request = Document;
    type Response = u64;

    async fn dispatch(&self, filters: Vec<Document>) -> Vec<Result<u64, BatchError>> {
        future::join_all(filters.into_iter().map(|filter| async move {
            self.store
                .count(&self.database, &self.collection, &filter)
                .await
                .map_err(store_error)
        }))
        .await
    }
}

/// Batched inserts. The whole batch folds into one unordered bulk insert;
/// each caller receives the id generated for its document, matched by
/// position. A store failure rejects the whole batch.
pub(crate) struct InsertDocuments<S: DocumentStore> {
    store: Arc<S>,
    database: String,
    collection: String,
}

impl<S: DocumentStore> InsertDocuments<S> {
    pub(crate) fn new(store: Arc<S>, database: String, collection: String) -> Self {
        InsertDocuments {
            store,
            database,
            collection,
        }
    }
}

impl<S: DocumentStore> Strategy for InsertDocuments<S> {
    type Request = Document;
    type Response = S::NativeId;

    async fn dispatch(&self, documents: Vec<Document>) -> Vec<Result<S::NativeId, BatchError>> {
        let num_documents = documents.len();
        match self
            .store
            .insert_bulk(&self.database, &self.collection, documents)
            .await
        {
            Ok(ids) if ids.len() == num_documents => ids.into_iter().map(Ok).collect(),
            Ok(ids) => {
                // The store broke the one-id-per-document contract
                let error = BatchError::Store(format!(
                    "bulk insert returned {} ids for {} documents",
                    ids.len(),
                    num_documents,
                ));
                (0..num_documents).map(|_| Err(error.clone())).collect()
            }
            Err(error) => {
                let error = store_error(error);
                (0..num_documents).map(|_| Err(error.clone())).collect()
            }
        }
    }
}

/// Batched updates. Payloads flatten to partial-update documents, updates
/// with no non-empty field are dropped, and the survivors fold into one
/// unordered bulk write. Every caller resolves `true` once the bulk call
/// lands, whether or not its update matched a document.
pub(crate) struct UpdateDocuments<S: DocumentStore> {
    store: Arc<S>,
    database: String,
    collection: String,
}

impl<S: DocumentStore> UpdateDocuments<S> {
    pub(crate) fn new(store: Arc<S>, database: String, collection: String) -> Self {
        UpdateDocuments {
            store,
            database,
            collection,
        }
    }
}

impl<S: DocumentStore> Strategy for UpdateDocuments<S> {
    type Request = (String, UpdatePayload);
    type Response = bool;

    async fn dispatch(
        &self,
        requests: Vec<(String, UpdatePayload)>,
    ) -> Vec<Result<bool, BatchError>> {
        let writes: Vec<UpdateWrite<S::NativeId>> = requests
            .iter()
            .flat_map(|(id, payload)| {
                payload
                    .updates()
                    .iter()
                    .filter(|update| has_non_empty_field(update))
                    .map(|update| UpdateWrite {
                        id: self.store.normalize_id(id),
                        update: update.clone(),
                    })
            })
            .collect();

        // No surviving writes: skip the store call and resolve every key
        if writes.is_empty() {
            return requests.iter().map(|_| Ok(true)).collect();
        }

        match self
            .store
            .update_bulk(&self.database, &self.collection, writes)
            .await
        {
            Ok(()) => requests.iter().map(|_| Ok(true)).collect(),
            Err(error) => {
                let error = store_error(error);
                requests.iter().map(|_| Err(error.clone())).collect()
            }
        }
    }
}
