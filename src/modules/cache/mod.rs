// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    num::NonZeroUsize,
    sync::{LazyLock, Mutex},
};

use lru::LruCache;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{modules::settings::cli::SETTINGS, utc_now};

pub static ANALYSIS_CACHE: LazyLock<TtlCache> = LazyLock::new(TtlCache::init);

#[derive(Clone, Debug)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: i64,
}

/// Process-wide best-effort cache for analyzer results and statistics,
/// keyed by `(user_id, namespace, fingerprint)`. Entries expire on read;
/// capacity is bounded with LRU eviction. A miss is never an error and a
/// corrupted entry is treated as a miss and evicted.
pub struct TtlCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl TtlCache {
    fn init() -> Self {
        let capacity = NonZeroUsize::new(SETTINGS.mailsweep_cache_max_entries as usize)
            .unwrap_or(NonZeroUsize::new(1024).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn compose_key(user_id: &str, namespace: &str, fingerprint: &str) -> String {
        format!("{user_id}:{namespace}:{fingerprint}")
    }

    pub fn get<T: DeserializeOwned>(
        &self,
        user_id: &str,
        namespace: &str,
        fingerprint: &str,
    ) -> Option<T> {
        let key = Self::compose_key(user_id, namespace, fingerprint);
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(&key)?.clone();
        if entry.expires_at <= utc_now!() {
            entries.pop(&key);
            return None;
        }
        match serde_json::from_value(entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                // Quarantine: any unexpected shape is a miss.
                debug!("Evicting corrupted cache entry '{key}': {e}");
                entries.pop(&key);
                None
            }
        }
    }

    pub fn set<T: Serialize>(
        &self,
        user_id: &str,
        namespace: &str,
        fingerprint: &str,
        value: &T,
        ttl_seconds: u64,
    ) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let key = Self::compose_key(user_id, namespace, fingerprint);
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key,
                CacheEntry {
                    value,
                    expires_at: utc_now!() + (ttl_seconds as i64) * 1000,
                },
            );
        }
    }

    /// Drops every entry for a `(user, namespace)` pair; used after writes
    /// that invalidate derived values.
    pub fn delete_prefix(&self, user_id: &str, namespace: &str) {
        let prefix = format!("{user_id}:{namespace}:");
        if let Ok(mut entries) = self.entries.lock() {
            let stale: Vec<String> = entries
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                entries.pop(&key);
            }
        }
    }

    pub fn flush(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = TtlCache::init();
        cache.set("u-1", "stats", "all", &42u32, 60);
        assert_eq!(cache.get::<u32>("u-1", "stats", "all"), Some(42));
    }

    #[test]
    fn expired_entries_read_as_misses() {
        let cache = TtlCache::init();
        cache.set("u-1", "stats", "all", &42u32, 0);
        assert_eq!(cache.get::<u32>("u-1", "stats", "all"), None);
    }

    #[test]
    fn wrong_shape_is_a_miss_and_evicts() {
        let cache = TtlCache::init();
        cache.set("u-1", "stats", "all", &"not-a-number", 60);
        assert_eq!(cache.get::<u32>("u-1", "stats", "all"), None);
        // The corrupted entry was quarantined, not left behind.
        assert_eq!(cache.get::<String>("u-1", "stats", "all"), None);
    }

    #[test]
    fn delete_prefix_only_touches_one_namespace() {
        let cache = TtlCache::init();
        cache.set("u-1", "stats", "all", &1u32, 60);
        cache.set("u-1", "analysis", "all", &2u32, 60);
        cache.delete_prefix("u-1", "stats");
        assert_eq!(cache.get::<u32>("u-1", "stats", "all"), None);
        assert_eq!(cache.get::<u32>("u-1", "analysis", "all"), Some(2));
    }
}
