use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::{BatchError, Document};

pub(crate) type LoadResult = Result<Option<Document>, BatchError>;

/// A pending-or-resolved load, shared by every caller asking for the same
/// id.
pub(crate) type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// Cache for one load loader, mapping id strings to pending-or-resolved
/// futures.
///
/// The future itself is the cache entry. Evicting an id does not disturb
/// callers already holding the future, and a batch finishing after an
/// eviction does not resurrect the entry. Cloning is shallow.
pub(crate) struct LoadCache {
    entries: Arc<DashMap<String, SharedLoad>>,
}

impl LoadCache {
    pub(crate) fn new() -> Self {
        LoadCache {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Return the cached future for `id`, or insert one draining the
    /// receiver produced by `make`. `make` runs only when the id is not
    /// cached; the caller uses it to register the id with the loader's
    /// dispatch task.
    pub(crate) fn get_or_insert_with(
        &self,
        id: &str,
        make: impl FnOnce() -> oneshot::Receiver<LoadResult>,
    ) -> SharedLoad {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let result_rx = make();
                let future = pending_load(result_rx, self.clone(), id.to_string());
                entry.insert(future.clone());
                future
            }
        }
    }

    /// Evict one id. In-flight futures resolve normally; the next load for
    /// the id fetches again.
    pub(crate) fn remove(&self, id: &str) {
        self.entries.remove(id);
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &LoadCache) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl Clone for LoadCache {
    fn clone(&self) -> Self {
        LoadCache {
            entries: self.entries.clone(),
        }
    }
}

/// Wrap a dispatch-task receiver into a shareable load future. A sender
/// dropped without a result means the loader task is gone; the entry evicts
/// itself so later loads do not hang on a dead future.
fn pending_load(
    result_rx: oneshot::Receiver<LoadResult>,
    cache: LoadCache,
    id: String,
) -> SharedLoad {
    async move {
        match result_rx.await {
            Ok(result) => result,
            Err(_) => {
                cache.remove(&id);
                Err(BatchError::SendError)
            }
        }
    }
    .boxed()
    .shared()
}
