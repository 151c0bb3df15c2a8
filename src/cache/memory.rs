//! In-process TTL cache store.
//!
//! Default store for single-node deployments and tests. Scan cursors are
//! resume-after-key tokens, so a traversal visits every surviving key
//! exactly once even while matches are being deleted between scan steps.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::{CacheError, CacheStore, StoreInfo, glob_match};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    /// Scan resume points: cursor token -> last key handed out.
    cursors: Mutex<HashMap<u64, String>>,
    cursor_seq: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn live_keys_sorted(&self) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at > now);
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl CacheStore for InMemoryStore {
    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, CacheError>> + Send + '_>> {
        let key = key.to_owned();
        Box::pin(async move {
            let now = Instant::now();
            let mut entries =
                self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(&key);
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CacheError>> + Send + '_>> {
        let key = key.to_owned();
        Box::pin(async move {
            let entry = Entry {
                value,
                expires_at: Instant::now() + ttl,
            };
            self.entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, entry);
            Ok(())
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<u64, CacheError>> + Send + '_>> {
        let key = key.to_owned();
        Box::pin(async move {
            let removed = self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(&key);
            Ok(u64::from(removed.is_some()))
        })
    }

    fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Pin<Box<dyn Future<Output = Result<(u64, Vec<String>), CacheError>> + Send + '_>> {
        let pattern = pattern.to_owned();
        Box::pin(async move {
            let resume_after = if cursor == 0 {
                None
            } else {
                let taken = self
                    .cursors
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(&cursor);
                match taken {
                    Some(key) => Some(key),
                    // Unknown cursor (expired traversal): end the scan.
                    None => return Ok((0, Vec::new())),
                }
            };

            let keys = self.live_keys_sorted();
            let window: Vec<String> = keys
                .into_iter()
                .skip_while(|key| resume_after.as_ref().is_some_and(|after| key <= after))
                .take(count.max(1))
                .collect();

            let next = match window.last() {
                Some(last) if window.len() == count.max(1) => {
                    let token = self.cursor_seq.fetch_add(1, Ordering::Relaxed) + 1;
                    self.cursors
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .insert(token, last.clone());
                    token
                }
                _ => 0,
            };

            let matched = window
                .into_iter()
                .filter(|key| glob_match(&pattern, key))
                .collect();
            Ok((next, matched))
        })
    }

    fn info(&self) -> Pin<Box<dyn Future<Output = Result<StoreInfo, CacheError>> + Send + '_>> {
        Box::pin(async move {
            let now = Instant::now();
            let mut entries =
                self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            entries.retain(|_, entry| entry.expires_at > now);
            let memory_bytes: u64 = entries
                .iter()
                .map(|(key, entry)| (key.len() + entry.value.len()) as u64)
                .sum();
            Ok(StoreInfo {
                key_count: entries.len() as u64,
                memory_bytes,
            })
        })
    }
}
