//! Memoization of derived tables.

use crate::error::Result;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;

/// Identity of a memoized computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    op: &'static str,
    content: u64,
    params: String,
}

impl CacheKey {
    /// Key an operation on its input content hash and serialized parameters.
    pub fn new<P: Serialize + ?Sized>(op: &'static str, content: u64, params: &P) -> Result<Self> {
        Ok(Self {
            op,
            content,
            params: serde_json::to_string(params)?,
        })
    }
}

/// Hit/miss counters of a [`MemoCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// Results of previous computations, keyed by [`CacheKey`].
///
/// Errors are never cached.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: HashMap<CacheKey, Box<dyn Any>>,
    hits: usize,
    misses: usize,
}

impl MemoCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    pub fn get_or_try_insert_with<T, F>(&mut self, key: CacheKey, compute: F) -> Result<T>
    where
        T: Clone + 'static,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.entries.get(&key).and_then(|v| v.downcast_ref::<T>()) {
            self.hits += 1;
            return Ok(value.clone());
        }
        self.misses += 1;
        let value = compute()?;
        self.entries.insert(key, Box::new(value.clone()));
        Ok(value)
    }

    /// Drop every cached value.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Number of cached values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
