//! In-memory time-series store
//!
//! `MemoryStore` is the plain data structure; `SharedStore` wraps it in an
//! `Arc<RwLock<..>>` so every connection task works on the same instance.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Key that `get` expands to every stored series
pub const WILDCARD: &str = "*";

/// A single recorded point of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Samples per key, each sequence ascending by timestamp
pub type QueryResult = BTreeMap<String, Vec<Sample>>;

/// Trait defining the interface for time-series storage operations
pub trait Store: Send + Sync {
    /// Record `value` at `(key, timestamp)`, replacing any earlier value there
    fn put(&mut self, key: &str, value: f64, timestamp: i64) -> Result<()>;

    /// Look up one key, or every key when `key` is the wildcard
    fn get(&self, key: &str) -> Result<QueryResult>;

    /// Number of distinct keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory series storage, unsorted until read
#[derive(Debug, Default)]
pub struct MemoryStore {
    series: HashMap<String, HashMap<i64, f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of samples across all keys
    pub fn sample_count(&self) -> usize {
        self.series.values().map(HashMap::len).sum()
    }

    fn sorted(points: Option<&HashMap<i64, f64>>) -> Vec<Sample> {
        let mut samples: Vec<Sample> = points
            .into_iter()
            .flatten()
            .map(|(&timestamp, &value)| Sample::new(timestamp, value))
            .collect();
        samples.sort_unstable_by_key(|sample| sample.timestamp);
        samples
    }
}

impl Store for MemoryStore {
    fn put(&mut self, key: &str, value: f64, timestamp: i64) -> Result<()> {
        self.series
            .entry(key.to_string())
            .or_default()
            .insert(timestamp, value);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<QueryResult> {
        if key == WILDCARD {
            return Ok(self
                .series
                .iter()
                .map(|(key, points)| (key.clone(), Self::sorted(Some(points))))
                .collect());
        }

        let mut result = QueryResult::new();
        result.insert(key.to_string(), Self::sorted(self.series.get(key)));
        Ok(result)
    }

    fn len(&self) -> usize {
        self.series.len()
    }
}

/// Process-wide handle to one store, cheap to clone
#[derive(Debug)]
pub struct SharedStore<S = MemoryStore> {
    inner: Arc<RwLock<S>>,
}

impl SharedStore {
    /// A handle to a fresh, empty `MemoryStore`
    pub fn new() -> Self {
        Self::from_store(MemoryStore::new())
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> SharedStore<S> {
    pub fn from_store(store: S) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Exclusive access; held for a whole request batch
    pub async fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.inner.write().await
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, S> {
        self.inner.read().await
    }

    pub async fn put(&self, key: &str, value: f64, timestamp: i64) -> Result<()> {
        self.write().await.put(key, value, timestamp)
    }

    pub async fn get(&self, key: &str) -> Result<QueryResult> {
        self.read().await.get(key)
    }

    pub async fn len(&self) -> usize {
        self.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.read().await.is_empty()
    }
}
