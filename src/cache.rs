//! In-memory thumbnail cache keyed by artwork ID.
//!
//! Entries are evicted least-recently-used once the capacity is reached.
//! Validity is scoped to one device session: the client clears the cache on
//! shutdown and whenever the art channel has to be re-established.

use crate::types::ArtworkId;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;

struct CacheEntry {
    bytes: Bytes,
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<ArtworkId, CacheEntry>,
    clock: u64,
    current: Option<ArtworkId>,
}

/// Thumbnail bytes keyed by artwork ID
pub struct ArtworkCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ArtworkCache {
    /// Create a cache holding at most `capacity` thumbnails (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                clock: 0,
                current: None,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cached thumbnail for `artwork_id`, marking it recently used
    pub fn get(&self, artwork_id: &str) -> Option<Bytes> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;
        inner.entries.get_mut(artwork_id).map(|entry| {
            entry.last_used = tick;
            entry.bytes.clone()
        })
    }

    /// Store a thumbnail, evicting the least recently used entry if full
    pub fn insert(&self, artwork_id: &str, bytes: Bytes) {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let tick = inner.clock;

        if !inner.entries.contains_key(artwork_id) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(artwork_id = %oldest, "Evicting thumbnail");
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(
            artwork_id.to_string(),
            CacheEntry {
                bytes,
                last_used: tick,
            },
        );
    }

    /// Remove a single thumbnail
    pub fn invalidate(&self, artwork_id: &str) -> bool {
        self.inner.lock().entries.remove(artwork_id).is_some()
    }

    /// Remove every thumbnail and forget the current pointer
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.current = None;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, artwork_id: &str) -> bool {
        self.inner.lock().entries.contains_key(artwork_id)
    }

    /// Point "current artwork" at a new ID
    ///
    /// Returns the previous ID when the pointer moved. Stored bytes stay keyed
    /// by their own ID.
    pub fn set_current(&self, artwork_id: Option<&str>) -> Option<Option<ArtworkId>> {
        let mut inner = self.inner.lock();
        if inner.current.as_deref() == artwork_id {
            return None;
        }
        let previous = std::mem::replace(&mut inner.current, artwork_id.map(str::to_string));
        Some(previous)
    }

    /// ID the current pointer refers to
    pub fn current(&self) -> Option<ArtworkId> {
        self.inner.lock().current.clone()
    }
}
