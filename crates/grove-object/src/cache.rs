//! Bounded cache of parsed objects.

use std::num::NonZeroUsize;

use grove_hash::ObjectId;
use lru::LruCache;

use crate::Object;

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

pub struct ObjectCache {
    inner: LruCache<ObjectId, Object>,
}

impl ObjectCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(cap),
        }
    }

    /// Look up and mark as recently used.
    pub fn get(&mut self, oid: &ObjectId) -> Option<&Object> {
        self.inner.get(oid)
    }

    pub fn insert(&mut self, oid: ObjectId, object: Object) {
        self.inner.put(oid, object);
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.inner.contains(oid)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
