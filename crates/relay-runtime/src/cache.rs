use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Time-bounded memoization keyed by string.
///
/// Expired entries are removed lazily on access, plus on demand via
/// [`TtlCache::cleanup_expired`]. The cache is not thread-safe on its own;
/// owners running under a multi-threaded scheduler wrap it in a mutex.
pub struct TtlCache<V> {
    default_ttl: Duration,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> TtlCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the value if present and unexpired. An entry whose expiry
    /// instant has been reached counts as absent and is dropped.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some(entry) => Instant::now() >= entry.expires_at,
            None => return None,
        };

        if expired {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key).map(|e| &e.value)
    }

    /// Inserts a value, with an optional per-entry TTL overriding the default.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes an entry. Returns whether it existed.
    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.expires_at);
        before - self.entries.len()
    }

    /// Entry count, expired entries included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Liveness observations per backend.
///
/// Negative results expire faster than positive ones so recoveries are
/// detected promptly.
pub struct HealthCache {
    cache: TtlCache<bool>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

pub const DEFAULT_POSITIVE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCacheStats {
    pub entries: usize,
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
}

impl HealthCache {
    pub fn new(positive_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(positive_ttl),
            positive_ttl,
            negative_ttl,
        }
    }

    pub fn get(&mut self, backend: &str) -> Option<bool> {
        self.cache.get(backend).copied()
    }

    pub fn set(&mut self, backend: &str, healthy: bool) {
        let ttl = if healthy {
            self.positive_ttl
        } else {
            self.negative_ttl
        };
        self.cache.set(backend, healthy, Some(ttl));
    }

    pub fn invalidate(&mut self, backend: &str) -> bool {
        self.cache.invalidate(backend)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> HealthCacheStats {
        HealthCacheStats {
            entries: self.cache.len(),
            positive_ttl: self.positive_ttl,
            negative_ttl: self.negative_ttl,
        }
    }
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::new(DEFAULT_POSITIVE_TTL, DEFAULT_NEGATIVE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.set("a", 1u32, None);
        assert_eq!(cache.get("a"), Some(&1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_entry_expires() {
        let mut cache = TtlCache::new(Duration::from_millis(20));
        cache.set("a", 1u32, None);
        assert_eq!(cache.get("a"), Some(&1));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("a"), None);
        // Lazy removal happened on access
        assert!(cache.is_empty());
    }

    #[test]
    fn test_per_entry_ttl_overrides_default() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        cache.set("short", 1u32, Some(Duration::from_millis(10)));
        cache.set("long", 2u32, None);

        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(&2));
    }

    #[test]
    fn test_entry_at_expiry_instant_is_absent() {
        let mut cache = TtlCache::new(Duration::ZERO);
        cache.set("a", 1u32, Some(Duration::ZERO));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_invalidate() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.set("a", 1u32, None);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_clear() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.set("a", 1u32, None);
        cache.set("b", 2u32, None);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired_counts() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.set("dead1", 1u32, Some(Duration::from_millis(5)));
        cache.set("dead2", 2u32, Some(Duration::from_millis(5)));
        cache.set("live", 3u32, None);

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_health_cache_negative_ttl_shorter() {
        let mut cache = HealthCache::new(Duration::from_secs(30), Duration::from_millis(20));
        cache.set("down", false);
        cache.set("up", true);

        assert_eq!(cache.get("down"), Some(false));
        std::thread::sleep(Duration::from_millis(35));

        // The negative entry expired, the positive one is still fresh
        assert_eq!(cache.get("down"), None);
        assert_eq!(cache.get("up"), Some(true));
    }

    #[test]
    fn test_health_cache_overwrite_on_reprobe() {
        let mut cache = HealthCache::default();
        cache.set("svc", false);
        cache.set("svc", true);
        assert_eq!(cache.get("svc"), Some(true));
    }

    #[test]
    fn test_health_cache_stats() {
        let mut cache = HealthCache::default();
        cache.set("a", true);
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.positive_ttl, DEFAULT_POSITIVE_TTL);
        assert_eq!(stats.negative_ttl, DEFAULT_NEGATIVE_TTL);
    }
}
