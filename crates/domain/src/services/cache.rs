use std::time::Duration;

use moka::sync::Cache;

/// Trait describing a cache of webhook event ids already claimed by this
/// process. Only positive knowledge is cached: an id that is absent from the
/// cache must still go through the atomic claim in storage.
pub trait EventCache: Send + Sync {
    /// Returns `true` if the event id is known to be claimed.
    fn is_known(&self, event_id: &str) -> bool;

    /// Records the event id as claimed.
    fn mark_seen(&self, event_id: &str);
}

#[derive(Debug)]
pub struct InMemoryEventCache {
    seen: Cache<String, ()>,
}

impl EventCache for InMemoryEventCache {
    fn is_known(&self, event_id: &str) -> bool {
        self.seen.contains_key(event_id)
    }

    fn mark_seen(&self, event_id: &str) {
        self.seen.insert(event_id.to_owned(), ());
    }
}

impl InMemoryEventCache {
    /// Processor retries span days; an hour of hits covers the burst of
    /// redeliveries that follows a slow response.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_CAPACITY: u64 = 50_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }
}

impl Default for InMemoryEventCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

/// Cache that never remembers anything; every lookup falls through to storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventCache;

impl EventCache for NoopEventCache {
    fn is_known(&self, _event_id: &str) -> bool {
        false
    }

    fn mark_seen(&self, _event_id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_presence() {
        let cache = InMemoryEventCache::default();
        assert!(!cache.is_known("evt_1"));
        cache.mark_seen("evt_1");
        assert!(cache.is_known("evt_1"));
        assert!(!cache.is_known("evt_2"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = InMemoryEventCache::new(Duration::from_millis(10));
        cache.mark_seen("evt_1");
        std::thread::sleep(Duration::from_millis(30));
        assert!(!cache.is_known("evt_1"));
    }

    #[test]
    fn noop_cache_never_hits() {
        let cache = NoopEventCache;
        cache.mark_seen("evt_1");
        assert!(!cache.is_known("evt_1"));
    }
}
