//! Result cache keyed by tenant and normalized question.
//!
//! Entries expire passively on read. The map is bounded; inserting past the
//! cap evicts the oldest write.

pub mod single_flight;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

pub use single_flight::SingleFlight;

use crate::config::CacheConfig;
use crate::dispatch::DispatchDecision;
use crate::executor::RawResult;
use crate::question::TenantId;

/// SHA-256 hex of the tenant and normalized question text.
pub fn cache_key(tenant: &TenantId, normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub decision: DispatchDecision,
    pub result: Option<RawResult>,
    pub tenant: TenantId,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self::new(CacheConfig::disabled())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl()
    }

    /// Live entry for `key`. An expired entry is removed and reported as a
    /// miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(CacheEntry::is_expired) {
            entries.remove(key);
            debug!(key, "cache entry expired");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(
        &self,
        key: impl Into<String>,
        tenant: &TenantId,
        decision: DispatchDecision,
        result: Option<RawResult>,
        ttl: Duration,
    ) {
        if !self.config.enabled {
            return;
        }
        let key = key.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if !entries.contains_key(&key) && entries.len() >= self.config.max_entries {
            entries.retain(|_, entry| !entry.is_expired());
            while entries.len() >= self.config.max_entries {
                let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.created_at)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                decision,
                result,
                tenant: tenant.clone(),
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Store the executed result on an existing live entry. Returns false
    /// when there is no such entry.
    pub fn attach_result(&self, key: &str, result: RawResult) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.result = Some(result);
                true
            }
            _ => false,
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Drop every entry for `tenant`, e.g. after its data changed.
    pub fn invalidate_tenant(&self, tenant: &TenantId) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| &entry.tenant != tenant);
        let removed = before - entries.len();
        info!(%tenant, removed, "invalidated tenant cache entries");
        removed
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("result cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StrategySource;
    use crate::registry::{ResultShape, ToolKind, ToolParams};

    fn resolved() -> DispatchDecision {
        DispatchDecision::Resolved {
            tool: ToolKind::CountRecords,
            params: ToolParams::new().with("collection", "order"),
            confidence: 0.95,
            source: StrategySource::Deterministic,
        }
    }

    fn cache(max_entries: usize) -> ResultCache {
        ResultCache::new(CacheConfig {
            max_entries,
            ..Default::default()
        })
    }

    #[test]
    fn test_key_separates_tenants() {
        let a = cache_key(&TenantId::from("10"), "how many orders");
        let b = cache_key(&TenantId::from("11"), "how many orders");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, cache_key(&TenantId::from("10"), "how many orders"));
    }

    #[test]
    fn test_hit_and_attach() {
        let cache = cache(10);
        let tenant = TenantId::from("10");
        cache.put("k", &tenant, resolved(), None, Duration::from_secs(60));

        let entry = cache.get("k").unwrap();
        assert_eq!(entry.decision, resolved());
        assert!(entry.result.is_none());

        assert!(cache.attach_result("k", RawResult::single("count", 42.into())));
        assert!(cache.get("k").unwrap().result.is_some());
        assert!(!cache.attach_result("missing", RawResult::empty(ResultShape::List)));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = cache(10);
        cache.put("k", &TenantId::from("10"), resolved(), None, Duration::ZERO);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_oldest_write_is_evicted() {
        let cache = cache(2);
        let tenant = TenantId::from("10");
        let ttl = Duration::from_secs(60);
        cache.put("a", &tenant, resolved(), None, ttl);
        std::thread::sleep(Duration::from_millis(2));
        cache.put("b", &tenant, resolved(), None, ttl);
        std::thread::sleep(Duration::from_millis(2));
        cache.put("c", &tenant, resolved(), None, ttl);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_tenant() {
        let cache = cache(10);
        let ttl = Duration::from_secs(60);
        cache.put("a", &TenantId::from("10"), resolved(), None, ttl);
        cache.put("b", &TenantId::from("10"), resolved(), None, ttl);
        cache.put("c", &TenantId::from("11"), resolved(), None, ttl);

        assert_eq!(cache.invalidate_tenant(&TenantId::from("10")), 2);
        assert!(cache.get("c").is_some());
        assert!(cache.invalidate("c"));
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = ResultCache::disabled();
        cache.put("k", &TenantId::from("10"), resolved(), None, Duration::from_secs(60));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
