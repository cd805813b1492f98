//! Routes from a compilation target to specializations
//!
//! Backends ask the target for a `SpecializationSource`. Current backends
//! get a cached lookup over the method table's own code cache; legacy ones
//! need an `Interpreter` bound to a world, a table, a cache token and the
//! inference/optimization parameter sets.

use std::sync::Arc;

use super::ResolutionError;
use super::cache::{CacheKey, CodeCache, Specialization};
use super::method_table::{Callable, MethodTable, WorldAge};
use super::types::Type;

/// Something that can turn a call signature into a specialization.
pub trait SpecializationSource {
    fn world(&self) -> WorldAge;
    fn specialize(
        &self,
        callable: &Callable,
        arg_types: &[Type],
    ) -> Result<Arc<Specialization>, ResolutionError>;
}

/// Type inference parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceParams {
    /// Call sites with more matching methods than this are left dynamic.
    pub max_methods: usize,
    pub aggressive_constant_propagation: bool,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            max_methods: 3,
            aggressive_constant_propagation: false,
        }
    }
}

/// Optimizer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationParams {
    pub inlining: bool,
    pub inline_cost_threshold: u32,
}

impl Default for OptimizationParams {
    fn default() -> Self {
        Self {
            inlining: true,
            inline_cost_threshold: 100,
        }
    }
}

/// Lookup through a method table, memoized in its code cache.
pub struct CachedLookup<'a> {
    table: &'a MethodTable,
    token: String,
    world: WorldAge,
}

impl<'a> CachedLookup<'a> {
    pub fn new(table: &'a MethodTable, token: impl Into<String>, world: WorldAge) -> Self {
        Self {
            table,
            token: token.into(),
            world,
        }
    }
}

fn resolve_cached(
    cache: &CodeCache,
    table: &MethodTable,
    token: &str,
    world: WorldAge,
    callable: &Callable,
    arg_types: &[Type],
) -> Result<Arc<Specialization>, ResolutionError> {
    let key = CacheKey {
        token: token.to_string(),
        function: callable.name().to_string(),
        arg_types: arg_types.to_vec(),
        world,
    };
    cache.get_or_insert_with(key, || table.lookup(callable, arg_types, world))
}

impl SpecializationSource for CachedLookup<'_> {
    fn world(&self) -> WorldAge {
        self.world
    }

    fn specialize(
        &self,
        callable: &Callable,
        arg_types: &[Type],
    ) -> Result<Arc<Specialization>, ResolutionError> {
        resolve_cached(
            self.table.code_cache(),
            self.table,
            &self.token,
            self.world,
            callable,
            arg_types,
        )
    }
}

/// Per-job interpreter with a private cache.
pub struct Interpreter {
    world: WorldAge,
    method_table: Arc<MethodTable>,
    cache_token: String,
    inference: InferenceParams,
    optimization: OptimizationParams,
    cache: CodeCache,
}

impl Interpreter {
    pub fn new(
        world: WorldAge,
        method_table: Arc<MethodTable>,
        cache_token: impl Into<String>,
        inference: InferenceParams,
        optimization: OptimizationParams,
    ) -> Self {
        Self {
            world,
            method_table,
            cache_token: cache_token.into(),
            inference,
            optimization,
            cache: CodeCache::default(),
        }
    }

    pub fn method_table(&self) -> &Arc<MethodTable> {
        &self.method_table
    }

    pub fn cache_token(&self) -> &str {
        &self.cache_token
    }

    pub fn inference_params(&self) -> &InferenceParams {
        &self.inference
    }

    pub fn optimization_params(&self) -> &OptimizationParams {
        &self.optimization
    }

    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }
}

impl SpecializationSource for Interpreter {
    fn world(&self) -> WorldAge {
        self.world
    }

    fn specialize(
        &self,
        callable: &Callable,
        arg_types: &[Type],
    ) -> Result<Arc<Specialization>, ResolutionError> {
        resolve_cached(
            &self.cache,
            &self.method_table,
            &self.cache_token,
            self.world,
            callable,
            arg_types,
        )
    }
}
