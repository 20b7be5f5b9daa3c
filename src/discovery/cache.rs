//! Resource storage shared between discovery runs.
//!
//! [`ResourceCache`] lives as long as its owning [`Discovery`](super::Discovery)
//! and is shared by every run it performs. [`RunResources`] is the private
//! overlay of a single run; lookups go through [`ResourceAccess`], which
//! consults the overlay before the cache.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use indexmap::IndexMap;

use super::resource::{normalize_url, Resource};

/// Process-scoped URL to resource map. Additive only; never evicted.
#[derive(Debug, Clone, Default)]
pub struct ResourceCache {
    entries: Arc<DashMap<String, Arc<Resource>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Arc<Resource>> {
        self.entries
            .get(&normalize_url(url))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Upsert; the last writer for a URL wins.
    pub fn insert(&self, resource: Arc<Resource>) {
        self.entries.insert(resource.url.clone(), resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resources captured by one discovery run, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RunResources {
    entries: Arc<Mutex<IndexMap<String, Arc<Resource>>>>,
}

impl RunResources {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Arc<Resource>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, url: &str) -> Option<Arc<Resource>> {
        self.lock().get(&normalize_url(url)).cloned()
    }

    pub fn insert(&self, resource: Arc<Resource>) {
        self.lock().insert(resource.url.clone(), resource);
    }

    /// Removes a resource, keeping the order of the rest.
    pub fn remove(&self, url: &str) -> Option<Arc<Resource>> {
        self.lock().shift_remove(&normalize_url(url))
    }

    pub fn snapshot(&self) -> Vec<Arc<Resource>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// The get/save hook pair handed to the page's request interception.
#[derive(Debug, Clone)]
pub struct ResourceAccess {
    run: RunResources,
    cache: Option<ResourceCache>,
}

impl ResourceAccess {
    /// `cache` is `None` when the snapshot disables caching.
    pub fn new(run: RunResources, cache: Option<ResourceCache>) -> Self {
        Self { run, cache }
    }

    pub fn get(&self, url: &str) -> Option<Arc<Resource>> {
        self.run
            .get(url)
            .or_else(|| self.cache.as_ref().and_then(|cache| cache.get(url)))
    }

    pub fn save(&self, resource: Resource) {
        let resource = Arc::new(resource);
        self.run.insert(Arc::clone(&resource));
        if let Some(cache) = &self.cache {
            cache.insert(resource);
        }
    }

    pub fn run(&self) -> &RunResources {
        &self.run
    }
}
