//! Process-wide bounded TTL cache shared across all connector facades.
//!
//! Keys are namespaced by purpose and connector instance id so one
//! `moka` cache can safely back every facade (per the design note that
//! this is observationally identical to one cache per facade).

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache as MokaCache;
use moka::{Expiry, Policy};
use serde::Serialize;

/// Builds canonical cache keys: JSON-encoded parts joined by `|`, with
/// attribute projections sorted and deduplicated before encoding so two
/// semantically identical requests always collide on the same key.
pub struct CacheKey;

impl CacheKey {
    pub fn schema(instance_id: &str) -> String {
        format!(
            "{}|{}",
            encode(&"schema"),
            encode(&instance_id)
        )
    }

    pub fn get(instance_id: &str, object_class: &str, uid: &str, attrs_to_get: &[String]) -> String {
        let mut sorted = attrs_to_get.to_vec();
        sorted.sort();
        sorted.dedup();
        format!(
            "{}|{}|{}|{}|{}",
            encode(&"get"),
            encode(&instance_id),
            encode(&object_class),
            encode(&uid),
            encode(&sorted)
        )
    }

    /// Prefix used to invalidate every `get` entry for an object class,
    /// or a single uid within it when `uid` is `Some`.
    pub fn get_prefix(instance_id: &str, object_class: &str, uid: Option<&str>) -> String {
        match uid {
            Some(uid) => format!(
                "{}|{}|{}|{}",
                encode(&"get"),
                encode(&instance_id),
                encode(&object_class),
                encode(&uid)
            ),
            None => format!(
                "{}|{}|{}",
                encode(&"get"),
                encode(&instance_id),
                encode(&object_class)
            ),
        }
    }

    pub fn schema_prefix(instance_id: &str) -> String {
        format!("{}|{}", encode(&"schema"), encode(&instance_id))
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[derive(Clone)]
struct Entry {
    value: Arc<serde_json::Value>,
}

struct PerEntryExpiry;

impl Expiry<String, (Entry, Duration)> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &(Entry, Duration),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.1)
    }
}

/// Bounded LRU with per-entry TTL, capacity ~10,000, default TTL 60s.
#[derive(Clone)]
pub struct TtlCache {
    inner: MokaCache<String, (Entry, Duration)>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(capacity: u64, default_ttl: Duration) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryExpiry)
            .support_invalidation_closures()
            .build();
        Self { inner, default_ttl }
    }

    /// Returns the value only if present and not expired.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.get(key).map(|(entry, _)| (*entry.value).clone())
    }

    /// Insert with an explicit per-entry TTL override.
    pub fn set_with_ttl(&self, key: String, value: serde_json::Value, ttl: Duration) {
        self.inner.insert(
            key,
            (
                Entry {
                    value: Arc::new(value),
                },
                ttl,
            ),
        );
    }

    pub fn set(&self, key: String, value: serde_json::Value) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn delete(&self, key: &str) {
        self.inner.invalidate(key);
    }

    /// Invalidate every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let prefix = prefix.to_string();
        let _ = self
            .inner
            .invalidate_entries_if(move |k, _v| k.starts_with(&prefix));
    }

    pub fn policy(&self) -> Policy {
        self.inner.policy()
    }

    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
