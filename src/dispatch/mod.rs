//! Specialization resolution
//!
//! Stand-in for the source language's own dispatch machinery, reduced to
//! what job construction needs: a type lattice, callables, method tables
//! with world ages, and caches of resolved specializations.

pub mod cache;
pub mod interp;
pub mod method_table;
pub mod types;

pub use cache::{CacheKey, CodeCache, Specialization};
pub use interp::{
    CachedLookup, InferenceParams, Interpreter, OptimizationParams, SpecializationSource,
};
pub use method_table::{
    Callable, Method, MethodId, MethodTable, WorldAge, current_world, default_method_table,
    install_default_method_table,
};
pub use types::Type;

use thiserror::Error;

/// Failure to turn `(callable, argument types)` into a specialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no method matching `{signature}` in {world}")]
    NoMethod { signature: String, world: WorldAge },

    #[error("`{signature}` is ambiguous between {}", .candidates.join(" and "))]
    Ambiguous {
        signature: String,
        candidates: Vec<String>,
    },

    #[error("`{signature}` has non-concrete argument type `{ty}`")]
    NonConcrete { signature: String, ty: Type },
}
