//! In-process counter cache.
//!
//! Mirrors the counter-relevant rows of the `"values"` table so id and
//! number allocation do not need a read query every time. The cache is a
//! derived shadow of storage, never authoritative: it must be populated by
//! the store's startup routine before any counter is read, and the store
//! only writes it after the corresponding storage commit.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Value kinds the cache can hold.
///
/// Counters are integers; everything else the corpus stores is a short
/// string, so a two-armed union covers all callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Int(i64),
    Text(String),
}

impl CacheValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CacheValue::Int(v) => Some(*v),
            CacheValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CacheValue::Int(_) => None,
            CacheValue::Text(s) => Some(s),
        }
    }
}

/// Process-local key→value store.
///
/// `add` and `update` are deliberately distinct operations so that an
/// accidental re-initialization of an existing counter fails loudly
/// instead of silently clobbering it.
#[derive(Debug, Default)]
pub struct CounterCache {
    entries: HashMap<String, CacheValue>,
}

impl CounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new entry. Fails if the key is already present.
    pub fn add(&mut self, key: &str, value: CacheValue) -> Result<()> {
        if self.entries.contains_key(key) {
            return Err(Error::DuplicateCacheKey(key.to_string()));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Look up an entry. Absence is not an error here; for counter keys the
    /// store treats it as a programming error because startup pre-seeds
    /// every counter.
    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.entries.get(key)
    }

    /// Overwrite an existing entry. Fails if the key was never added.
    pub fn update(&mut self, key: &str, value: CacheValue) -> Result<()> {
        match self.entries.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::UnknownCacheKey(key.to_string())),
        }
    }

    /// Remove an entry. Removing a missing key is a no-op.
    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
