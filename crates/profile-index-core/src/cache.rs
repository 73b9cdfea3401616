//! Dedup cache
//!
//! A key → marker store with per-entry TTL. The validation consumer claims
//! `(profile_url, version)` here before doing any fetch work.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::CacheError;

/// Marker value stored for a claimed key
pub const PROCESSED: &str = "processed";

/// Key → marker store with TTL
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Value for `key` if present and not expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Drop `key` so the next claim succeeds
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Store `value` only if `key` is absent; returns whether this call won.
    ///
    /// The default is a get followed by a set. Backends with an atomic
    /// set-if-absent should override it.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.set(key, value, ttl).await?;
        Ok(true)
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    let whole = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    if ttl.subsec_nanos() > 0 {
        whole.saturating_add(1)
    } else {
        whole
    }
}

#[derive(Default)]
struct Entries {
    /// key → (value, expiry in unix seconds)
    map: HashMap<String, (String, i64)>,
    last_sweep: i64,
}

impl Entries {
    /// Drop expired entries, at most once per clock second
    fn sweep(&mut self, now: i64) {
        if now <= self.last_sweep {
            return;
        }
        self.last_sweep = now;
        self.map.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

/// Process-local dedup cache
///
/// Expiry follows the injected [`Clock`]. Expired entries are swept on
/// writes, so keys that are never read again do not accumulate.
pub struct InMemoryDedupCache {
    entries: Mutex<Entries>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryDedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDedupCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            clock,
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now_unix();
        self.entries
            .lock()
            .map(|e| e.map.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held, expired or not
    pub fn stored(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    fn locked(&self) -> Result<MutexGuard<'_, Entries>, CacheError> {
        self.entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl DedupCache for InMemoryDedupCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.locked()?;
        let now = self.clock.now_unix();
        match entries.map.get(key) {
            Some((value, expires_at)) if *expires_at > now => Ok(Some(value.clone())),
            Some(_) => {
                entries.map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.locked()?;
        let now = self.clock.now_unix();
        entries.sweep(now);
        entries
            .map
            .insert(key.to_string(), (value.to_string(), now.saturating_add(ttl_secs(ttl))));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.locked()?.map.remove(key);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut entries = self.locked()?;
        let now = self.clock.now_unix();
        entries.sweep(now);
        if matches!(entries.map.get(key), Some((_, exp)) if *exp > now) {
            return Ok(false);
        }
        entries
            .map
            .insert(key.to_string(), (value.to_string(), now.saturating_add(ttl_secs(ttl))));
        Ok(true)
    }
}
