//! Process-wide cache of materialized record lists.
//!
//! Memory galleries (`.mem`) replay a list stored here. A list is populated
//! lazily on first access to its key and lives until [`MemoryGalleries::teardown`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use super::descriptor::GalleryDescriptor;
use super::record::Record;
use crate::util::Result;

/// Shared, immutable view of a cached list.
pub type RecordList = Arc<Vec<Record>>;

static GLOBAL: Lazy<MemoryGalleries> = Lazy::new(MemoryGalleries::new);

/// Thread-safe map from gallery name to record list.
///
/// Uses `parking_lot::RwLock` for non-poisoning locks. Lookups hand out
/// `Arc` clones, so readers never copy records and a repeated lookup returns
/// the same allocation.
pub struct MemoryGalleries {
    lists: RwLock<HashMap<String, RecordList>>,
    /// Number of loader invocations (for diagnostics).
    loads: AtomicUsize,
}

impl MemoryGalleries {
    pub fn new() -> Self {
        Self {
            lists: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    /// The process-wide instance.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Cache identity of a descriptor: its name, options excluded.
    #[inline]
    fn key(descriptor: &GalleryDescriptor) -> &str {
        &descriptor.name
    }

    #[inline]
    pub fn get(&self, descriptor: &GalleryDescriptor) -> Option<RecordList> {
        self.lists.read().get(Self::key(descriptor)).cloned()
    }

    pub fn contains(&self, descriptor: &GalleryDescriptor) -> bool {
        self.lists.read().contains_key(Self::key(descriptor))
    }

    /// Store `records`, replacing any previous list.
    pub fn insert(&self, descriptor: &GalleryDescriptor, records: Vec<Record>) -> RecordList {
        let list = Arc::new(records);
        self.lists
            .write()
            .insert(Self::key(descriptor).to_string(), Arc::clone(&list));
        list
    }

    /// Cached list, or the result of `load` stored under the key.
    ///
    /// The loader runs without the lock held, so it may itself use the cache.
    /// If two threads race, the first stored list wins and both get it.
    pub fn get_or_load<F>(&self, descriptor: &GalleryDescriptor, load: F) -> Result<RecordList>
    where
        F: FnOnce() -> Result<Vec<Record>>,
    {
        if let Some(list) = self.get(descriptor) {
            return Ok(list);
        }
        let records = load()?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!("cached {} records for {}", records.len(), descriptor.name);

        let mut lists = self.lists.write();
        let list = lists
            .entry(Self::key(descriptor).to_string())
            .or_insert_with(|| Arc::new(records));
        Ok(Arc::clone(list))
    }

    /// Append one record, creating the list if needed.
    ///
    /// Outstanding `Arc`s keep seeing the list as it was when they were taken.
    pub fn append(&self, descriptor: &GalleryDescriptor, record: Record) {
        let mut lists = self.lists.write();
        let list = lists.entry(Self::key(descriptor).to_string()).or_default();
        Arc::make_mut(list).push(record);
    }

    pub fn remove(&self, descriptor: &GalleryDescriptor) -> Option<RecordList> {
        self.lists.write().remove(Self::key(descriptor))
    }

    /// Number of cached lists.
    pub fn len(&self) -> usize {
        self.lists.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.read().is_empty()
    }

    /// Number of times a loader populated the cache.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Drop every cached list.
    pub fn teardown(&self) {
        let mut lists = self.lists.write();
        debug!("releasing {} cached galleries", lists.len());
        lists.clear();
    }
}

impl Default for MemoryGalleries {
    fn default() -> Self {
        Self::new()
    }
}
