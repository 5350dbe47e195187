use std::borrow::Cow;
use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::LoadCache;
use crate::dispatcher::{DispatchOptions, Dispatcher};
use crate::store::DocumentStore;
use crate::strategy::{
    CountDocuments, FindDocuments, InsertDocuments, LoadDocuments, UpdateDocuments,
};

/// Identifies one loader within an operation's table. The operation itself
/// is the table, so the key is the remaining (database, collection) pair.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct LoaderKey {
    pub(crate) database: String,
    pub(crate) collection: String,
}

impl LoaderKey {
    fn label(&self, batch_label: &str, operation: &str) -> String {
        format!(
            "{batch_label}:{operation}:{}/{}",
            self.database, self.collection,
        )
    }
}

/// The load loader pairs its dispatcher with the id cache that the facade
/// and the dispatch task both touch.
pub(crate) struct LoadLoader<S: DocumentStore> {
    pub(crate) dispatcher: Dispatcher<LoadDocuments<S>>,
    pub(crate) cache: LoadCache,
}

impl<S: DocumentStore> Clone for LoadLoader<S> {
    fn clone(&self) -> Self {
        LoadLoader {
            dispatcher: self.dispatcher.clone(),
            cache: self.cache.clone(),
        }
    }
}

/// Lazily creates and memoizes one loader per (operation, database,
/// collection). Loaders live for the registry's lifetime and there is no
/// eviction: the key space is bounded by application call sites, not by
/// request volume.
pub(crate) struct LoaderRegistry<S: DocumentStore> {
    store: Arc<S>,
    label: Cow<'static, str>,
    options: DispatchOptions,
    load: DashMap<LoaderKey, LoadLoader<S>>,
    load_all: DashMap<LoaderKey, Dispatcher<FindDocuments<S>>>,
    count: DashMap<LoaderKey, Dispatcher<CountDocuments<S>>>,
    insert: DashMap<LoaderKey, Dispatcher<InsertDocuments<S>>>,
    update: DashMap<LoaderKey, Dispatcher<UpdateDocuments<S>>>,
}

impl<S: DocumentStore> LoaderRegistry<S> {
    pub(crate) fn new(store: S, label: Cow<'static, str>, options: DispatchOptions) -> Self {
        LoaderRegistry {
            store: Arc::new(store),
            label,
            options,
            load: DashMap::new(),
            load_all: DashMap::new(),
            count: DashMap::new(),
            insert: DashMap::new(),
            update: DashMap::new(),
        }
    }

    /// The load loader for `key`, spawning it on first use.
    pub(crate) fn load(&self, key: &LoaderKey) -> LoadLoader<S> {
        self.load
            .entry(key.clone())
            .or_insert_with(|| {
                let cache = LoadCache::new();
                let strategy = LoadDocuments::new(
                    self.store.clone(),
                    key.database.clone(),
                    key.collection.clone(),
                    cache.clone(),
                );
                let dispatcher =
                    Dispatcher::spawn(strategy, key.label(&self.label, "load"), self.options);
                LoadLoader { dispatcher, cache }
            })
            .value()
            .clone()
    }

    /// The load loader for `key`, only if one was already created. Used by
    /// `clear`: a loader that never existed has nothing cached.
    pub(crate) fn existing_load(&self, key: &LoaderKey) -> Option<LoadLoader<S>> {
        self.load.get(key).map(|loader| loader.value().clone())
    }

    pub(crate) fn load_all(&self, key: &LoaderKey) -> Dispatcher<FindDocuments<S>> {
        self.load_all
            .entry(key.clone())
            .or_insert_with(|| {
                let strategy = FindDocuments::new(
                    self.store.clone(),
                    key.database.clone(),
                    key.collection.clone(),
                );
                Dispatcher::spawn(strategy, key.label(&self.label, "load_all"), self.options)
            })
            .value()
            .clone()
    }

    pub(crate) fn count(&self, key: &LoaderKey) -> Dispatcher<CountDocuments<S>> {
        self.count
            .entry(key.clone())
            .or_insert_with(|| {
                let strategy = CountDocuments::new(
                    self.store.clone(),
                    key.database.clone(),
                    key.collection.clone(),
                );
                Dispatcher::spawn(strategy, key.label(&self.label, "count"), self.options)
            })
            .value()
            .clone()
    }

    pub(crate) fn insert(&self, key: &LoaderKey) -> Dispatcher<InsertDocuments<S>> {
        self.insert
            .entry(key.clone())
            .or_insert_with(|| {
                let strategy = InsertDocuments::new(
                    self.store.clone(),
                    key.database.clone(),
                    key.collection.clone(),
                );
                Dispatcher::spawn(strategy, key.label(&self.label, "insert"), self.options)
            })
            .value()
            .clone()
    }

    pub(crate) fn update(&self, key: &LoaderKey) -> Dispatcher<UpdateDocuments<S>> {
        self.update
            .entry(key.clone())
            .or_insert_with(|| {
                let strategy = UpdateDocuments::new(
                    self.store.clone(),
                    key.database.clone(),
                    key.collection.clone(),
                );
                Dispatcher::spawn(strategy, key.label(&self.label, "update"), self.options)
            })
            .value()
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn num_load_loaders(&self) -> usize {
        self.load.len()
    }
}
