//! # Result Cache
//!
//! Capacity-bounded memoisation store for workflow results.
//!
//! ## Eviction
//!
//! When the cache is full and a new key is inserted, every entry is scored as
//! `access_count / (1 + seconds_since_last_access)` and the single lowest
//! scoring entry is removed. Ties go to the entry inserted first. Reads check
//! expiry and drop expired entries lazily, counting them as misses.
//!
//! Time is read from `tokio::time::Instant`, so tests running with a paused
//! clock can advance expiry and recency deterministically.

use crate::constants::defaults;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::CACHE_CAPACITY,
            ttl_seconds: defaults::CACHE_TTL.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub size: usize,
    pub capacity: usize,
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

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    access_count: u64,
    last_access: Instant,
    /// Insertion sequence, used to break score ties
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn score(&self, now: Instant) -> f64 {
        let idle = now.saturating_duration_since(self.last_access).as_secs_f64();
        self.access_count as f64 / (1.0 + idle)
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_seq: u64,
    stats: CacheStats,
}

/// Result cache with hybrid frequency/recency eviction and TTL expiry.
#[derive(Debug)]
pub struct ResultCache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_seq: 0,
                stats: CacheStats {
                    capacity,
                    ..CacheStats::default()
                },
            }),
            capacity,
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity, config.ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry, refreshing its access count and recency.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let expired = match state.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.access_count += 1;
                entry.last_access = now;
                let value = entry.value.clone();
                state.stats.hits += 1;
                debug!(key = %key, "Cache hit");
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.stats.expirations += 1;
            debug!(key = %key, "Cache entry expired");
        }
        state.stats.misses += 1;
        None
    }

    /// Insert with the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }

        let key = key.into();
        let now = Instant::now();
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = now + ttl;
            entry.last_access = now;
            return;
        }

        if state.entries.len() >= self.capacity {
            if let Some(victim) = Self::lowest_scoring(&state.entries, now) {
                state.entries.remove(&victim);
                state.stats.evictions += 1;
                debug!(key = %victim, "Evicted cache entry");
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + ttl,
                access_count: 1,
                last_access: now,
                seq,
            },
        );
    }

    fn lowest_scoring(entries: &HashMap<String, CacheEntry<V>>, now: Instant) -> Option<String> {
        entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.score(now)
                    .total_cmp(&b.score(now))
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(key, _)| key.clone())
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.state.lock().entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| e.expires_at > now)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Drop every expired entry now rather than on next read.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, e| e.expires_at > now);
        let purged = before - state.entries.len();
        state.stats.expirations += purged as u64;
        purged
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
        debug!("Cleared result cache");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            ..state.stats.clone()
        }
    }
}
