//! Batches and caches operations against a document store.
//!
//! `drover` sits between application code issuing many fine-grained document
//! requests and a store that is cheapest when requests arrive grouped.
//! Concurrent requests for the same operation against the same database and
//! collection coalesce into one store call per batching window, and
//! single-document loads are additionally cached for the facade's lifetime.
//!
//! The entry point is [`Batch`], built over any [`DocumentStore`]
//! implementation. See the [`Batch`] docs for the semantics of each
//! operation.

pub(crate) mod batch;
pub(crate) mod cache;
pub(crate) mod dispatcher;
pub(crate) mod error;
pub(crate) mod query;
pub(crate) mod registry;
pub(crate) mod store;
pub(crate) mod strategy;

pub use batch::{Batch, BatchBuilder, Collection, DEFAULT_DATABASE};
pub use error::BatchError;
pub use query::{FindQuery, Page, UpdatePayload};
pub use store::{Document, DocumentId, DocumentStore, UpdateWrite};
