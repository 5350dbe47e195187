use std::fmt::Display;

use async_trait::async_trait;

/// A document held by a [`DocumentStore`]: a JSON object whose primary key
/// lives in the `"_id"` field.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// An id filter value produced by id normalization.
///
/// Callers address documents by string. A string matching the store's native
/// id shape is converted to the native id type before it reaches the store;
/// anything else passes through as the raw string. See
/// [`DocumentStore::normalize_id`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentId<I> {
    /// The string matched the store's native id shape and was converted.
    Native(I),
    /// The string did not match and is used as the filter value as-is.
    Raw(String),
}

/// One entry of a bulk update: a partial-update document applied to the
/// document matching `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateWrite<I> {
    pub id: DocumentId<I>,
    pub update: Document,
}

/// A driver for a document store organized into named databases holding
/// named collections.
///
/// [`Batch`](crate::Batch) calls these primitives once per dispatched batch,
/// so an implementation should make each of them a single store round trip
/// where the underlying driver allows it. Errors are stringified before
/// being fanned out to the callers waiting on a batch, so `Error` only needs
/// to implement [`Display`].
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// The store's native primary key type.
    type NativeId: Clone + Send + Sync + 'static;

    /// The error returned by a failed store call.
    type Error: Display + Send + Sync + 'static;

    /// Parse `raw` as a native id. `Some` means the string matches the
    /// store's native id shape; `None` means it does not, and the raw
    /// string itself becomes the filter value.
    fn parse_native_id(&self, raw: &str) -> Option<Self::NativeId>;

    /// Normalize one caller-provided id string into an id filter.
    fn normalize_id(&self, raw: &str) -> DocumentId<Self::NativeId> {
        match self.parse_native_id(raw) {
            Some(native) => DocumentId::Native(native),
            None => DocumentId::Raw(raw.to_string()),
        }
    }

    /// Fetch every document whose `"_id"` matches one of `ids`. Result
    /// order does not matter, and ids with no matching document are simply
    /// absent from the result.
    async fn find_by_ids(
        &self,
        database: &str,
        collection: &str,
        ids: &[DocumentId<Self::NativeId>],
    ) -> Result<Vec<Document>, Self::Error>;

    /// Fetch documents matching `filter`, skipping the first `skip` matches
    /// and returning at most `limit`.
    async fn find_page(
        &self,
        database: &str,
        collection: &str,
        filter: &Document,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Document>, Self::Error>;

    /// Count every document matching `filter`, ignoring pagination.
    async fn count(
        &self,
        database: &str,
        collection: &str,
        filter: &Document,
    ) -> Result<u64, Self::Error>;

    /// Insert all of `documents` in one unordered bulk write.
    ///
    /// The returned ids must be in input order: index `i` holds the id
    /// under which `documents[i]` was stored. Batched insert results are
    /// distributed positionally, so a driver that reports generated ids
    /// keyed by operation index has to reorder them before returning.
    async fn insert_bulk(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Self::NativeId>, Self::Error>;

    /// Apply all of `writes` in one unordered bulk write, each write
    /// updating at most one document. There is no per-write result; the
    /// call either succeeds or fails as a whole.
    async fn update_bulk(
        &self,
        database: &str,
        collection: &str,
        writes: Vec<UpdateWrite<Self::NativeId>>,
    ) -> Result<(), Self::Error>;
}

/// The string form of an `"_id"` value, used to key batched load results.
/// String ids are taken verbatim; other JSON values render through their
/// canonical JSON form.
pub(crate) fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}
