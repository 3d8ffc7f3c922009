use crate::domain::ports::{CacheError, CacheStore};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// A process-local TTL cache.
///
/// Expiry is measured on the tokio clock, so paused-time tests can step over
/// TTLs without sleeping. Expired entries are dropped lazily on access.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    failing_ops: Arc<AtomicUsize>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.failing_ops.store(count, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.expires_at > now).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn injected_failure(&self) -> Result<(), CacheError> {
        let took = self
            .failing_ops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match took {
            Ok(_) => Err(CacheError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.injected_failure()?;
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop it so the map does not grow unbounded.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, expires_in: Duration) -> Result<(), CacheError> {
        self.injected_failure()?;
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + expires_in,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.injected_failure()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        self.injected_failure()?;
        if pattern.is_empty() {
            return Err(CacheError::InvalidPattern(pattern.to_string()));
        }
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok(before - entries.len())
    }
}

/// Matches `text` against a glob where `*` is any run of characters and `?`
/// exactly one.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
