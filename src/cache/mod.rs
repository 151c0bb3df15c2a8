//! Read-through cache gateway with pattern invalidation.
//!
//! Caching is strictly a performance layer: every store failure is counted
//! as a miss (reads) or swallowed (writes/deletes) and nothing here ever
//! propagates an error to an ingestion or query path. With caching disabled
//! every `get` is a guaranteed miss and every mutation a no-op.

pub mod memory;

pub use memory::InMemoryStore;

use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How many keys one scan step asks the store for. Bounded so pattern
/// deletion never blocks the store with a full keyspace enumeration.
const SCAN_BATCH: usize = 100;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),
}

/// Store-level counters surfaced by `stats()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreInfo {
    pub key_count: u64,
    pub memory_bytes: u64,
}

/// Contract for the underlying key-value store.
///
/// `scan` is a cursor API: it returns keys matching the glob from the given
/// cursor onward, plus the next cursor (0 when exhausted), visiting at most
/// `count` candidates per call.
pub trait CacheStore: Send + Sync {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>>;

    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>>;

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + '_>>;

    fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(u64, Vec<String>), CacheError>> + Send + '_>>;

    fn info(&self) -> Pin<Box<dyn Future<Output = Result<StoreInfo, CacheError>> + Send + '_>>;
}

/// Hit/miss counters owned by one gateway instance.
#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Snapshot returned by [`CacheGateway::stats`].
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub key_count: u64,
    pub memory_bytes: u64,
}

/// The cache facade used by the rest of the service.
pub struct CacheGateway {
    store: Arc<dyn CacheStore>,
    enabled: bool,
    default_ttl: Duration,
    counters: Counters,
}

impl CacheGateway {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, enabled: bool, default_ttl: Duration) -> Self {
        Self {
            store,
            enabled,
            default_ttl,
            counters: Counters::default(),
        }
    }

    /// Read a value. Disabled mode and store failures are both misses.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    Some(value)
                }
                Err(e) => {
                    debug!(key, error = %e, "Cached value is not valid JSON, treating as miss");
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                debug!(key, error = %e, "Cache read failed, treating as miss");
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write a value. Failures are swallowed; disabled mode is a no-op.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        if let Err(e) = self.store.set(key, value.to_string(), ttl).await {
            debug!(key, error = %e, "Cache write failed, ignoring");
        }
    }

    /// Delete one key. Failures are swallowed; disabled mode is a no-op.
    pub async fn delete(&self, key: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.store.delete(key).await {
            debug!(key, error = %e, "Cache delete failed, ignoring");
        }
    }

    /// Delete every key matching a glob pattern, in bounded scan batches.
    /// Returns how many keys were deleted.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        if !self.enabled {
            return 0;
        }

        let mut deleted = 0u64;
        let mut cursor = 0u64;
        loop {
            let (next, keys) = match self.store.scan(cursor, pattern, SCAN_BATCH).await {
                Ok(step) => step,
                Err(e) => {
                    debug!(pattern, error = %e, "Cache scan failed, stopping invalidation");
                    return deleted;
                }
            };

            // Delete the batch concurrently rather than key-by-key.
            let deletions =
                futures::future::join_all(keys.iter().map(|key| self.store.delete(key))).await;
            for result in deletions {
                match result {
                    Ok(n) => deleted += n,
                    Err(e) => debug!(pattern, error = %e, "Cache delete failed, ignoring"),
                }
            }

            if next == 0 {
                return deleted;
            }
            cursor = next;
        }
    }

    /// Invalidate the three namespaces that go stale when a project ingests
    /// new data: query results, stats rollups, and trace lookups.
    pub async fn invalidate_project_queries(&self, project_id: &str) -> u64 {
        let mut deleted = 0;
        deleted += self.delete_pattern(&format!("query:{project_id}:*")).await;
        deleted += self.delete_pattern(&format!("stats:{project_id}:*")).await;
        deleted += self.delete_pattern(&format!("trace:{project_id}:*")).await;
        deleted
    }

    pub async fn stats(&self) -> CacheStats {
        let info = if self.enabled {
            self.store.info().await.unwrap_or_default()
        } else {
            StoreInfo::default()
        };
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            key_count: info.key_count,
            memory_bytes: info.memory_bytes,
        }
    }

    pub fn reset_stats(&self) {
        self.counters.hits.store(0, Ordering::Relaxed);
        self.counters.misses.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Build a parameterized query key: `query:<project>:<param hash>`.
#[must_use]
pub fn query_key(project_id: &str, params: &Value) -> String {
    format!("query:{project_id}:{}", hash_params(params))
}

#[must_use]
pub fn stats_key(project_id: &str, window: &str) -> String {
    format!("stats:{project_id}:{window}")
}

#[must_use]
pub fn trace_key(project_id: &str, trace_id: &str) -> String {
    format!("trace:{project_id}:{trace_id}")
}

#[must_use]
pub fn sigma_rules_key(project_id: &str) -> String {
    format!("sigma:{project_id}:rules")
}

/// Hash a parameter object into a stable hex token.
///
/// Objects are canonicalized by recursively sorting keys before hashing, so
/// semantically identical parameter sets collide to the same key regardless
/// of construction order.
#[must_use]
pub fn hash_params(params: &Value) -> String {
    let canonical = canonical_json(params);
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{v}", Value::String(k.clone())))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Glob matching for key patterns: `*` matches any run, `?` one character.
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    glob_match_inner(pattern.as_bytes(), key.as_bytes())
}

fn glob_match_inner(pattern: &[u8], key: &[u8]) -> bool {
    match (pattern.first(), key.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match_inner(&pattern[1..], key)
                || (!key.is_empty() && glob_match_inner(pattern, &key[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match_inner(&pattern[1..], &key[1..]),
        (Some(p), Some(k)) if p == k => glob_match_inner(&pattern[1..], &key[1..]),
        _ => false,
    }
}
