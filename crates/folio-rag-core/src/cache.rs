//! TTL- and capacity-bounded memo of generated answers.
//!
//! Keys are the SHA-256 of the normalised message and intent label.
//! Entries older than the TTL are never returned, even before they are
//! physically removed. When an insert pushes the size past `max_size`,
//! the entry with the oldest *insertion* time is evicted (reads do not
//! refresh an entry).
//!
//! All state lives behind one `Mutex`, so each `get`/`set` is a single
//! critical section.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::intent::Intent;
use crate::models::GeneratedAnswer;

/// Stable cache key for a message and intent.
///
/// The message is trimmed and lowercased first, so trivially different
/// spellings of the same question share an entry.
pub fn cache_key(message: &str, intent: Intent) -> String {
    let normalised = message.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalised.as_bytes());
    hasher.update(b":");
    hasher.update(intent.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hits as a percentage of lookups, rounded to two decimals.
    pub hit_rate_percent: f64,
    pub ttl_seconds: u64,
}

struct CacheEntry {
    value: GeneratedAnswer,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

pub struct ResponseCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    max_size: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            max_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached answer for `message` under `intent`, if present and fresh.
    pub fn get(&self, message: &str, intent: Intent) -> Option<GeneratedAnswer> {
        self.get_at(message, intent, Instant::now())
    }

    fn get_at(&self, message: &str, intent: Intent, now: Instant) -> Option<GeneratedAnswer> {
        let key = cache_key(message, intent);
        let mut state = self.lock();

        let fresh = match state.entries.get(&key) {
            None => None,
            Some(entry) => Some(now.saturating_duration_since(entry.inserted_at) < self.ttl),
        };

        match fresh {
            Some(true) => {
                state.hits += 1;
                tracing::debug!(key = &key[..8], "cache hit");
                state.entries.get(&key).map(|e| e.value.clone())
            }
            Some(false) => {
                state.entries.remove(&key);
                state.misses += 1;
                tracing::debug!(key = &key[..8], "cache entry expired");
                None
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Insert or overwrite the answer for `message` under `intent`.
    pub fn set(&self, message: &str, intent: Intent, value: GeneratedAnswer) {
        self.set_at(message, intent, value, Instant::now());
    }

    fn set_at(&self, message: &str, intent: Intent, value: GeneratedAnswer, now: Instant) {
        let key = cache_key(message, intent);
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                seq,
            },
        );

        if state.entries.len() > self.max_size {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.inserted_at, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                tracing::debug!(key = &oldest[..8], size = state.entries.len(), "cache evicted oldest entry");
            }
        }
    }

    /// Remove every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        tracing::info!(count, "cache cleared");
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Instant::now())
    }

    fn cleanup_expired_at(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        let ttl = self.ttl;
        state
            .entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) < ttl);
        let removed = before - state.entries.len();
        if removed > 0 {
            tracing::info!(removed, "cache removed expired entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let hit_rate = if lookups > 0 {
            state.hits as f64 / lookups as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate_percent: (hit_rate * 100.0).round() / 100.0,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}
