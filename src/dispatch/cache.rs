//! Specializations and the compiled-code cache

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::method_table::{Callable, Method, WorldAge};
use super::types::{Type, signature_string};

/// A resolved unit of compilable code: one method applied to concrete
/// argument types in one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specialization {
    pub method: Arc<Method>,
    pub callable: Callable,
    pub arg_types: Vec<Type>,
    pub world: WorldAge,
}

impl Specialization {
    pub fn signature_string(&self) -> String {
        signature_string(self.callable.name(), &self.arg_types)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Partitions the cache per target configuration.
    pub token: String,
    pub function: String,
    pub arg_types: Vec<Type>,
    pub world: WorldAge,
}

/// Specializations already resolved, keyed by cache token.
#[derive(Debug, Default)]
pub struct CodeCache {
    entries: Mutex<HashMap<CacheKey, Arc<Specialization>>>,
}

impl CodeCache {
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Specialization>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Return the cached entry or insert the one `resolve` produces.
    /// Failures are not cached.
    pub fn get_or_insert_with<E>(
        &self,
        key: CacheKey,
        resolve: impl FnOnce() -> Result<Specialization, E>,
    ) -> Result<Arc<Specialization>, E> {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let spec = Arc::new(resolve()?);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(entries.entry(key).or_insert(spec)))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries stored under `token`.
    pub fn count_for(&self, token: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|key| key.token == token)
            .count()
    }

    /// Drop entries resolved in worlds older than `world`. Returns how many
    /// were removed.
    pub fn evict_before(&self, world: WorldAge) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| key.world >= world);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
