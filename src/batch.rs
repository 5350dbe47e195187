use std::borrow::Cow;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::dispatcher::{DispatchOptions, Submission};
use crate::query::{FindQuery, Page, UpdatePayload};
use crate::registry::{LoaderKey, LoaderRegistry};
use crate::store::{Document, DocumentStore};
use crate::BatchError;

/// Database name used for a [`Collection`] that does not name one, unless
/// the facade was built with
/// [`default_database`](BatchBuilder::default_database).
pub const DEFAULT_DATABASE: &str = "default";

/// Addresses a collection, optionally qualified by a database name.
///
/// Most call sites pass a bare collection name and stay in the facade's
/// default database; a `(collection, database)` pair reaches into another
/// database.
///
/// ```
/// use drover::Collection;
///
/// let sessions = Collection::from("sessions");
/// assert_eq!(sessions.name(), "sessions");
/// assert_eq!(sessions.database(), None);
///
/// let archived = Collection::from(("sessions", "archive"));
/// assert_eq!(archived.database(), Some("archive"));
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Collection {
    name: String,
    database: Option<String>,
}

impl Collection {
    /// A collection in the facade's default database.
    pub fn new(name: impl Into<String>) -> Self {
        Collection {
            name: name.into(),
            database: None,
        }
    }

    /// Qualify the collection with an explicit database.
    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database name, if one was given.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl From<&str> for Collection {
    fn from(name: &str) -> Self {
        Collection::new(name)
    }
}

impl From<String> for Collection {
    fn from(name: String) -> Self {
        Collection::new(name)
    }
}

impl From<(&str, &str)> for Collection {
    fn from((name, database): (&str, &str)) -> Self {
        Collection::new(name).in_database(database)
    }
}

impl From<(String, String)> for Collection {
    fn from((name, database): (String, String)) -> Self {
        Collection::new(name).in_database(database)
    }
}

/// Batches and caches operations against a [`DocumentStore`].
///
/// A `Batch` groups concurrent requests by operation, database, and
/// collection. Requests in one group made within a short timeframe (10ms by
/// default) are combined into a single batch, and the batch reaches the
/// store as one call wherever the store supports it: single-document loads
/// become one multi-id lookup, inserts and updates become one bulk write
/// each. Documents loaded by id are additionally cached, so repeated loads
/// of the same id hit the store only once.
///
/// The cache is held for the lifetime of the `Batch` and is never evicted
/// automatically; build one facade per unit of work (such as one API
/// request) rather than one per process. [`clear`](Batch::clear) evicts
/// single ids for callers that mutate data out from under the cache.
///
/// Batching trades latency for round trips. Each batched call can take up
/// to [`delay_duration`](BatchBuilder::delay_duration) longer than calling
/// the store directly, which pays off when many requests share the window.
///
/// Cloning is shallow: clones share loaders and caches, and requests from
/// clones batch together.
pub struct Batch<S: DocumentStore> {
    label: Cow<'static, str>,
    default_database: String,
    registry: Arc<LoaderRegistry<S>>,
}

impl<S: DocumentStore> Batch<S> {
    /// Start building a `Batch` over the given store. See
    /// [`BatchBuilder`] for the available options.
    ///
    /// # Examples
    ///
    /// ```
    /// # use async_trait::async_trait;
    /// # use drover::{Batch, Document, DocumentId, DocumentStore, UpdateWrite};
    /// # struct Driver;
    /// # #[async_trait]
    /// # impl DocumentStore for Driver {
    /// #     type NativeId = u64;
    /// #     type Error = anyhow::Error;
    /// #     fn parse_native_id(&self, raw: &str) -> Option<u64> { raw.parse().ok() }
    /// #     async fn find_by_ids(&self, _: &str, _: &str, _: &[DocumentId<u64>]) -> anyhow::Result<Vec<Document>> { unimplemented!() }
    /// #     async fn find_page(&self, _: &str, _: &str, _: &Document, _: u64, _: u64) -> anyhow::Result<Vec<Document>> { unimplemented!() }
    /// #     async fn count(&self, _: &str, _: &str, _: &Document) -> anyhow::Result<u64> { unimplemented!() }
    /// #     async fn insert_bulk(&self, _: &str, _: &str, _: Vec<Document>) -> anyhow::Result<Vec<u64>> { unimplemented!() }
    /// #     async fn update_bulk(&self, _: &str, _: &str, _: Vec<UpdateWrite<u64>>) -> anyhow::Result<()> { unimplemented!() }
    /// # }
    /// # #[tokio::main]
    /// # async fn main() {
    /// let batch = Batch::build(Driver)
    ///     .eager_batch_size(Some(50))
    ///     .delay_duration(tokio::time::Duration::from_millis(5))
    ///     .label("documents")
    ///     .finish();
    /// # let _ = batch;
    /// # }
    /// ```
    pub fn build(store: S) -> BatchBuilder<S> {
        BatchBuilder {
            store,
            delay_duration: tokio::time::Duration::from_millis(10),
            eager_batch_size: Some(100),
            label: "unlabeled-batch".into(),
            default_database: DEFAULT_DATABASE.to_string(),
        }
    }

    fn loader_key(&self, target: Collection) -> LoaderKey {
        LoaderKey {
            database: target
                .database
                .unwrap_or_else(|| self.default_database.clone()),
            collection: target.name,
        }
    }

    /// Load the document with the given id, either from the loader's cache
    /// or by joining the current batch's multi-id lookup.
    ///
    /// Resolves to `None` when the store has no matching document; absence
    /// is a value, not an error, and is cached like any other result. A
    /// store failure rejects every load in the batch, and the failed ids
    /// are not cached, so later loads retry.
    #[tracing::instrument(skip_all, fields(batch = %self.label))]
    pub async fn load(
        &self,
        id: impl ToString,
        target: impl Into<Collection>,
    ) -> Result<Option<Document>, BatchError> {
        let mut documents = self.load_ids(vec![id.to_string()], target.into()).await?;
        Ok(documents.remove(0))
    }

    /// Load the documents with the given ids, in input order. Missing
    /// documents come back as `None` in their position. Ids already cached
    /// are not submitted again; the rest join the current batch as one
    /// group.
    #[tracing::instrument(skip_all, fields(batch = %self.label, num_ids = ids.len()))]
    pub async fn load_many<I: ToString>(
        &self,
        ids: &[I],
        target: impl Into<Collection>,
    ) -> Result<Vec<Option<Document>>, BatchError> {
        let ids = ids.iter().map(|id| id.to_string()).collect();
        self.load_ids(ids, target.into()).await
    }

    async fn load_ids(
        &self,
        ids: Vec<String>,
        target: Collection,
    ) -> Result<Vec<Option<Document>>, BatchError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let loader = self.registry.load(&self.loader_key(target));

        let mut submissions = Vec::new();
        let mut pending = Vec::with_capacity(ids.len());
        for id in ids {
            let future = loader.cache.get_or_insert_with(&id, || {
                let (result_tx, result_rx) = oneshot::channel();
                submissions.push(Submission {
                    request: id.clone(),
                    result_tx,
                });
                result_rx
            });
            pending.push(future);
        }

        if !submissions.is_empty() {
            tracing::debug!(
                batch = %self.label,
                num_submitted = submissions.len(),
                "sending a batch of ids to fetch",
            );
            loader.dispatcher.submit(submissions)?;
        }

        let mut documents = Vec::with_capacity(pending.len());
        for future in pending {
            documents.push(future.await?);
        }
        Ok(documents)
    }

    /// Evict one cached load result so the next load of the id fetches
    /// again. Works on any cached outcome, including cached absence.
    /// In-flight loads holding the old entry still resolve; they just no
    /// longer populate the cache.
    #[tracing::instrument(skip_all, fields(batch = %self.label))]
    pub fn clear(&self, id: impl ToString, target: impl Into<Collection>) {
        if let Some(loader) = self
            .registry
            .existing_load(&self.loader_key(target.into()))
        {
            loader.cache.remove(&id.to_string());
        }
    }

    /// Run a paginated query, batched with other queries against the same
    /// collection. Results are never cached: value-identical queries are
    /// separate requests, each reaching the store on its own. A failing
    /// query rejects only its own caller.
    #[tracing::instrument(skip_all, fields(batch = %self.label))]
    pub async fn load_all(
        &self,
        query: impl Into<FindQuery>,
        target: impl Into<Collection>,
    ) -> Result<Page, BatchError> {
        let loader = self.registry.load_all(&self.loader_key(target.into()));
        loader.execute(query.into()).await
    }

    /// Count the documents matching `filter`, batched with other counts
    /// against the same collection. Pass an empty filter to count the whole
    /// collection. Never cached; a failing count rejects only its own
    /// caller.
    #[tracing::instrument(skip_all, fields(batch = %self.label))]
    pub async fn count(
        &self,
        filter: Document,
        target: impl Into<Collection>,
    ) -> Result<u64, BatchError> {
        let loader = self.registry.count(&self.loader_key(target.into()));
        loader.execute(filter).await
    }

    /// Insert one document, folded with concurrent inserts into a single
    /// unordered bulk write. Resolves to the id the store generated for
    /// this document. A store failure rejects every insert in the batch.
    #[tracing::instrument(skip_all, fields(batch = %self.label))]
    pub async fn insert(
        &self,
        document: Document,
        target: impl Into<Collection>,
    ) -> Result<S::NativeId, BatchError> {
        let loader = self.registry.insert(&self.loader_key(target.into()));
        loader.execute(document).await
    }

    /// Apply a partial update to the document with the given id, folded
    /// with concurrent updates into a single unordered bulk write. Updates
    /// with no non-empty field are dropped before the write; null, `""`,
    /// `[]`, and `{}` fields count as empty, while `0` and `false` do not.
    ///
    /// Resolves to `true` whenever the bulk write succeeds, even if the id
    /// matched no document; the store's bulk interface does not report
    /// per-write matches. A store failure rejects every update in the
    /// batch.
    #[tracing::instrument(skip_all, fields(batch = %self.label))]
    pub async fn update(
        &self,
        id: impl ToString,
        payload: impl Into<UpdatePayload>,
        target: impl Into<Collection>,
    ) -> Result<bool, BatchError> {
        let loader = self.registry.update(&self.loader_key(target.into()));
        loader.execute((id.to_string(), payload.into())).await
    }
}

impl<S: DocumentStore> Clone for Batch<S> {
    fn clone(&self) -> Self {
        Batch {
            label: self.label.clone(),
            default_database: self.default_database.clone(),
            registry: self.registry.clone(),
        }
    }
}

/// Used to configure a new [`Batch`]. A `BatchBuilder` is returned from
/// [`Batch::build`].
pub struct BatchBuilder<S: DocumentStore> {
    store: S,
    delay_duration: tokio::time::Duration,
    eager_batch_size: Option<usize>,
    label: Cow<'static, str>,
    default_database: String,
}

impl<S: DocumentStore> BatchBuilder<S> {
    /// The maximum amount of time a loader will wait to queue up more
    /// requests before dispatching a batch.
    pub fn delay_duration(mut self, delay: tokio::time::Duration) -> Self {
        self.delay_duration = delay;
        self
    }

    /// The number of requests to wait for before eagerly dispatching a
    /// batch. A value of `Some(n)` will dispatch once `n` or more requests
    /// have been queued (or once the timeout set by
    /// [`delay_duration`](BatchBuilder::delay_duration) is reached,
    /// whichever comes first). A value of `None` will never dispatch
    /// eagerly, always waiting for the timeout.
    ///
    /// Note that `eager_batch_size` **does not** cap the batch: a single
    /// [`Batch::load_many`] call with more ids than `eager_batch_size`
    /// dispatches immediately with all of them.
    pub fn eager_batch_size(mut self, eager_batch_size: Option<usize>) -> Self {
        self.eager_batch_size = eager_batch_size;
        self
    }

    /// Set a label for the facade. This is only used to improve diagnostic
    /// messages, such as log messages.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = label.into();
        self
    }

    /// The database used by [`Collection`] targets that do not name one.
    /// Defaults to [`DEFAULT_DATABASE`].
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = database.into();
        self
    }

    /// Create and return a [`Batch`] with the given options. Loaders are
    /// spawned lazily, so this can be called outside a Tokio runtime as
    /// long as the operations themselves run inside one.
    pub fn finish(self) -> Batch<S> {
        let registry = LoaderRegistry::new(
            self.store,
            self.label.clone(),
            DispatchOptions {
                delay_duration: self.delay_duration,
                eager_batch_size: self.eager_batch_size,
            },
        );

        Batch {
            label: self.label,
            default_database: self.default_database,
            registry: Arc::new(registry),
        }
    }
}
