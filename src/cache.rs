//! Snapshot cache
//!
//! Concurrency-safe keyed snapshot store shared by the orchestrator, the
//! source sync loop and the serving layer. `set` replaces the slice for a
//! key atomically with respect to readers; a reader never observes a
//! half-written snapshot.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::EndpointDescriptor;

/// Cache key for the full known set of descriptors
pub const FULL_KEY: &str = "currentConfigs";
/// Cache key for the currently published subset
pub const AVAILABLE_KEY: &str = "latestResults";

/// Keyed snapshot store for descriptor slices
#[derive(Default)]
pub struct CacheStore {
    cache: RwLock<HashMap<String, Vec<EndpointDescriptor>>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the snapshot stored under `key`
    pub fn set(&self, key: &str, data: Vec<EndpointDescriptor>) {
        self.cache.write().insert(key.to_string(), data);
    }

    /// Get a copy of the snapshot stored under `key`
    pub fn get(&self, key: &str) -> Option<Vec<EndpointDescriptor>> {
        self.cache.read().get(key).cloned()
    }

    /// Whether a snapshot exists under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.cache.read().contains_key(key)
    }
}
