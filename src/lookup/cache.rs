// src/lookup/cache.rs
//! Process-wide provider-result cache: key → {result, expiry}, absolute TTL,
//! no sliding refresh. Sharded so concurrent searches only contend on the
//! shard owning a key, never on a global lock. The clock is injected so
//! tests drive expiry deterministically.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::lookup::types::ProviderResult;

/// Time source for cache expiry and report timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const SHARD_COUNT: usize = 16;

struct Entry {
    result: ProviderResult,
    expires_at: DateTime<Utc>,
}

/// Sharded TTL cache of provider results, shared across searches.
pub struct ProviderResultCache {
    shards: Vec<RwLock<HashMap<String, Entry>>>,
}

impl Default for ProviderResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderResultCache {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self { shards }
    }

    fn shard(&self, key: &str) -> &RwLock<HashMap<String, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Fresh entry → a copy of the stored result flagged `from_cache`.
    /// Expired entries are evicted on the way out.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<ProviderResult> {
        let shard = self.shard(key);
        let expired = {
            let guard = shard.read().ok()?;
            match guard.get(key) {
                None => return None,
                Some(entry) if entry.expires_at > now => {
                    let mut hit = entry.result.clone();
                    hit.from_cache = true;
                    return Some(hit);
                }
                Some(_) => true,
            }
        };
        if expired {
            if let Ok(mut guard) = shard.write() {
                if guard.get(key).is_some_and(|e| e.expires_at <= now) {
                    guard.remove(key);
                }
            }
        }
        None
    }

    /// Store a fresh result under `key` for `ttl` from `now`. Negative and
    /// empty results are cached the same way as hits.
    pub fn put(&self, key: &str, result: &ProviderResult, ttl: Duration, now: DateTime<Utc>) {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut stored = result.clone();
        stored.from_cache = false;
        if let Ok(mut guard) = self.shard(key).write() {
            guard.insert(
                key.to_string(),
                Entry {
                    result: stored,
                    expires_at,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().map(|g| g.len()).unwrap_or(0))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::types::{ProviderCapability, ProviderStatus};
    use chrono::TimeZone;

    fn result(provider: &str) -> ProviderResult {
        ProviderResult {
            provider_id: provider.into(),
            capability: ProviderCapability::TextSearch,
            status: ProviderStatus::Empty,
            items: vec![],
            elapsed_ms: 12,
            diagnostics: None,
            from_cache: false,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn fresh_entry_is_returned_flagged_from_cache() {
        let cache = ProviderResultCache::new();
        cache.put("k", &result("usda"), Duration::from_secs(60), at(1000));
        let hit = cache.get("k", at(1030)).expect("fresh");
        assert!(hit.from_cache);
        assert_eq!(hit.provider_id, "usda");
    }

    #[test]
    fn expired_entry_is_evicted() {
        let cache = ProviderResultCache::new();
        cache.put("k", &result("usda"), Duration::from_secs(60), at(1000));
        assert!(cache.get("k", at(1061)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let cache = ProviderResultCache::new();
        cache.put("k", &result("usda"), Duration::from_secs(60), at(1000));
        // exactly at expiry → stale
        assert!(cache.get("k", at(1060)).is_none());
    }

    #[test]
    fn keys_are_independent() {
        let cache = ProviderResultCache::new();
        cache.put("a", &result("usda"), Duration::from_secs(60), at(0));
        cache.put("b", &result("off"), Duration::from_secs(60), at(0));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a", at(1)).unwrap().provider_id, "usda");
        assert_eq!(cache.get("b", at(1)).unwrap().provider_id, "off");
    }
}
