use crate::adapters::AdapterRegistry;
use crate::cache::{HealthCache, HealthCacheStats};
use relay_config::RelayConfig;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Caches per-backend liveness so routing does not hammer health endpoints.
///
/// Disabled backends are reported unhealthy without probing. Probe failures
/// are recorded as unhealthy under the shorter negative TTL, so recoveries
/// are noticed quickly.
pub struct HealthMonitor {
    config: Arc<RelayConfig>,
    registry: Arc<AdapterRegistry>,
    cache: Mutex<HealthCache>,
}

impl HealthMonitor {
    pub fn new(config: Arc<RelayConfig>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            config,
            registry,
            cache: Mutex::new(HealthCache::default()),
        }
    }

    pub fn with_cache(
        config: Arc<RelayConfig>,
        registry: Arc<AdapterRegistry>,
        cache: HealthCache,
    ) -> Self {
        Self {
            config,
            registry,
            cache: Mutex::new(cache),
        }
    }

    /// Cached liveness for one backend, probing on a miss.
    pub async fn probe(&self, name: &str) -> bool {
        let Some(backend) = self.config.backends.get(name) else {
            warn!("Unknown backend: {}", name);
            return false;
        };

        if !backend.enabled() {
            debug!("Backend '{}' is disabled", name);
            return false;
        }

        if let Some(cached) = self.cache.lock().unwrap().get(name) {
            debug!("Using cached health for '{}': {}", name, cached);
            return cached;
        }

        let healthy = match self.registry.get(name) {
            Some(adapter) => match adapter.health_check().await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!("Health check error for '{}': {}", name, e);
                    false
                }
            },
            None => {
                warn!("No adapter initialized for '{}'", name);
                false
            }
        };

        self.cache.lock().unwrap().set(name, healthy);
        healthy
    }

    /// Drops one cached entry, or every entry when `name` is `None`.
    pub fn invalidate(&self, name: Option<&str>) {
        let mut cache = self.cache.lock().unwrap();
        match name {
            Some(name) => {
                cache.invalidate(name);
                debug!("Invalidated health cache for '{}'", name);
            }
            None => {
                cache.clear();
                debug!("Cleared all health cache entries");
            }
        }
    }

    /// Current cached states without probing. Backends with no fresh entry
    /// are absent from the map.
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        let mut cache = self.cache.lock().unwrap();
        let mut snapshot = BTreeMap::new();
        for name in self.config.backends.keys() {
            if let Some(healthy) = cache.get(name) {
                snapshot.insert(name.clone(), healthy);
            }
        }
        snapshot
    }

    pub fn cache_stats(&self) -> HealthCacheStats {
        self.cache.lock().unwrap().stats()
    }
}
