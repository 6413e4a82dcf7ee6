//! In-memory response cache.
//!
//! [`MemoryCache`] implements [`sigil_core::Cache`] on top of a bounded
//! `moka` cache. Each entry carries its own [`Expiration`]:
//!
//! - `Never`: kept until evicted for capacity
//! - `At`: dropped once the deadline passes
//! - `Sliding`: dropped after the idle window; every hit restarts it

use std::time::{Duration, Instant};

use chrono::Utc;
use moka::Expiry;
use moka::sync::Cache as MokaCache;
use sigil_core::{Cache, Expiration};
use tracing::debug;

/// Entries kept before the least recently used ones are evicted.
pub const DEFAULT_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expiration: Expiration,
}

impl Entry {
    /// Time to live from now; `None` never expires.
    fn ttl(&self) -> Option<Duration> {
        match self.expiration {
            Expiration::Never => None,
            Expiration::At(deadline) => Some((deadline - Utc::now()).to_std().unwrap_or_default()),
            Expiration::Sliding(window) => Some(window),
        }
    }
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        value.ttl()
    }

    fn expire_after_read(
        &self,
        _key: &String,
        value: &Entry,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        match value.expiration {
            Expiration::Sliding(window) => Some(window),
            _ => duration_until_expiry,
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl()
    }
}

/// Bounded in-memory cache.
#[derive(Clone)]
pub struct MemoryCache {
    inner: MokaCache<String, Entry>,
}

impl MemoryCache {
    /// Creates a cache holding up to [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a cache holding up to `capacity` entries.
    pub fn with_capacity(capacity: u64) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { inner }
    }

    /// Returns the number of live entries.
    ///
    /// Pending evictions are applied first, so the count is exact.
    pub fn len(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }

    /// Returns true if no entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let hit = self.inner.get(key).map(|entry| entry.value);
        debug!(key = key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    fn insert(&self, key: &str, value: String, expiration: Expiration) {
        if let Expiration::At(deadline) = expiration {
            if deadline <= Utc::now() {
                debug!(key = key, "Skipping insert of already expired entry");
                return;
            }
        }
        self.inner.insert(key.to_string(), Entry { value, expiration });
    }

    fn remove(&self, key: &str) {
        self.inner.invalidate(key);
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = MemoryCache::new();
        cache.insert("k", "v".into(), Expiration::Never);
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.len(), 1);

        cache.remove("k");
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_absolute_expiration() {
        let cache = MemoryCache::new();
        let deadline = Utc::now() + chrono::Duration::milliseconds(50);
        cache.insert("k", "v".into(), Expiration::At(deadline));
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_past_deadline_not_stored() {
        let cache = MemoryCache::new();
        let deadline = Utc::now() - chrono::Duration::seconds(1);
        cache.insert("k", "v".into(), Expiration::At(deadline));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_sliding_expiration_renews_on_read() {
        let cache = MemoryCache::new();
        cache.insert("k", "v".into(), Expiration::Sliding(Duration::from_millis(150)));

        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(60));
            assert!(cache.get("k").is_some());
        }

        std::thread::sleep(Duration::from_millis(250));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new();
        cache.insert("a", "1".into(), Expiration::Never);
        cache.insert("b", "2".into(), Expiration::Never);
        cache.clear();
        assert!(cache.is_empty());
    }
}
