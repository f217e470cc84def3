//! Expiring request cache.
//!
//! Maps a normalized query to its previously computed result. Expiry is
//! lazy: entries past their deadline are treated as absent on lookup and
//! silently overwritten by later `set` calls. There is no sweeper task —
//! TTLs are short (tens of seconds), so growth is bounded by call volume.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::query::{Query, QueryResult};

struct CacheEntry {
    result: QueryResult,
    expires_at: DateTime<Utc>,
}

/// TTL cache keyed by query value.
#[derive(Default)]
pub struct RequestCache {
    entries: HashMap<Query, CacheEntry>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-key lookup. Returns `None` when no entry exists or when the
    /// entry expired — the two are indistinguishable to callers. An entry
    /// is already expired at its deadline instant, never served past it.
    pub fn get(&self, query: &Query, now: DateTime<Utc>) -> Option<QueryResult> {
        let entry = self.entries.get(query)?;
        if now >= entry.expires_at {
            return None;
        }
        Some(entry.result.clone())
    }

    /// Store `result` under `query` until `expires_at`. The stored copy is
    /// tagged `cached: true` so later hits are distinguishable from fresh
    /// fetches.
    pub fn set(&mut self, query: Query, mut result: QueryResult, expires_at: DateTime<Utc>) {
        result.cached = true;
        result.expiry = Some(expires_at);
        self.entries.insert(query, CacheEntry { result, expires_at });
    }

    /// Number of entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
