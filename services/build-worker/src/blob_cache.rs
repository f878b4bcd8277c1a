//! In-memory LRU cache for raw field blobs to reduce object-store reads.
//!
//! Adjacent time steps of one request usually share catalog files. The
//! cache holds the most recent blobs within a byte budget; when an insert
//! would exceed it, least-recently-used entries are popped until it fits.

use bytes::Bytes;
use lru::LruCache;

pub struct BlobCache {
    cache: LruCache<String, Bytes>,
    total_bytes: usize,
    max_bytes: usize,
}

impl BlobCache {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            cache: LruCache::unbounded(),
            total_bytes: 0,
            max_bytes,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        self.cache.get(key).cloned()
    }

    pub fn put(&mut self, key: &str, value: Bytes) {
        if value.len() > self.max_bytes {
            return;
        }
        if let Some(old) = self.cache.pop(key) {
            self.total_bytes -= old.len();
        }

        while self.total_bytes + value.len() > self.max_bytes {
            match self.cache.pop_lru() {
                Some((_, evicted)) => self.total_bytes -= evicted.len(),
                None => break,
            }
        }

        self.total_bytes += value.len();
        self.cache.put(key.to_string(), value);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let mut cache = BlobCache::new(1024);
        cache.put("a", Bytes::from_static(b"aaaa"));
        assert_eq!(cache.get("a").unwrap(), Bytes::from_static(b"aaaa"));
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_eviction_by_bytes() {
        let mut cache = BlobCache::new(10);
        cache.put("a", Bytes::from(vec![0u8; 4]));
        cache.put("b", Bytes::from(vec![0u8; 4]));
        cache.put("c", Bytes::from(vec![0u8; 4]));
        // "a" is the oldest and must have been evicted
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_recency_refresh_on_get() {
        let mut cache = BlobCache::new(10);
        cache.put("a", Bytes::from(vec![0u8; 4]));
        cache.put("b", Bytes::from(vec![0u8; 4]));
        cache.get("a");
        cache.put("c", Bytes::from(vec![0u8; 4]));
        // "b" was least recently used
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn test_oversized_value_not_cached() {
        let mut cache = BlobCache::new(4);
        cache.put("big", Bytes::from(vec![0u8; 8]));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overwrite_updates_budget() {
        let mut cache = BlobCache::new(10);
        cache.put("a", Bytes::from(vec![0u8; 8]));
        cache.put("a", Bytes::from(vec![1u8; 2]));
        cache.put("b", Bytes::from(vec![0u8; 8]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_resets_budget() {
        let mut cache = BlobCache::new(10);
        cache.put("a", Bytes::from(vec![0u8; 8]));
        cache.clear();
        assert!(cache.is_empty());
        // Full budget available again
        cache.put("b", Bytes::from(vec![0u8; 10]));
        assert_eq!(cache.len(), 1);
    }
}
