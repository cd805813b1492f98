//! Method tables and world ages
//!
//! A method table maps function names to methods (signatures over the type
//! lattice). Every definition happens in a new world; resolving against a
//! world snapshot only sees methods defined at or before it. Overlay tables
//! have a parent and shadow it: if the overlay has any applicable method the
//! parent is not consulted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use log::{debug, trace};

use super::ResolutionError;
use super::cache::{CodeCache, Specialization};
use super::types::{Type, signature_string};

static WORLD_COUNTER: AtomicU64 = AtomicU64::new(1);
static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(0);

/// Snapshot identifier of the set of defined methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldAge(pub u64);

impl fmt::Display for WorldAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world {}", self.0)
    }
}

/// The newest world.
pub fn current_world() -> WorldAge {
    WorldAge(WORLD_COUNTER.load(Ordering::SeqCst))
}

fn advance_world() -> WorldAge {
    WorldAge(WORLD_COUNTER.fetch_add(1, Ordering::SeqCst) + 1)
}

/// A callable value, identified by its function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callable {
    name: String,
}

impl Callable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(pub u64);

/// One method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub id: MethodId,
    pub function: String,
    pub signature: Vec<Type>,
    /// World the method was defined in.
    pub world: WorldAge,
    /// Name of the defining table.
    pub table: String,
}

impl Method {
    fn applies_to(&self, function: &str, arg_types: &[Type], world: WorldAge) -> bool {
        self.function == function
            && self.world <= world
            && self.signature.len() == arg_types.len()
            && arg_types
                .iter()
                .zip(&self.signature)
                .all(|(arg, param)| arg.is_subtype(param))
    }

    /// Strictly more specific than `other`.
    fn is_more_specific(&self, other: &Method) -> bool {
        self.signature != other.signature
            && self
                .signature
                .iter()
                .zip(&other.signature)
                .all(|(a, b)| a.is_subtype(b))
    }

    pub fn signature_string(&self) -> String {
        signature_string(&self.function, &self.signature)
    }
}

/// Resolution table for dynamic calls.
#[derive(Debug)]
pub struct MethodTable {
    name: String,
    parent: Option<Arc<MethodTable>>,
    methods: RwLock<Vec<Arc<Method>>>,
    cache: CodeCache,
}

impl MethodTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            methods: RwLock::new(Vec::new()),
            cache: CodeCache::default(),
        }
    }

    /// A table whose methods take precedence over `parent`'s.
    pub fn overlay(name: impl Into<String>, parent: Arc<MethodTable>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<MethodTable>> {
        self.parent.as_ref()
    }

    /// Compiled-code cache owned by this table.
    pub fn code_cache(&self) -> &CodeCache {
        &self.cache
    }

    /// Define a method in a new world. A later definition with the same
    /// signature replaces the earlier one from its world on.
    ///
    /// Cached specializations from older worlds are evicted; lookups pinned
    /// to an old world still work, they just resolve again.
    pub fn define(&self, function: &str, signature: Vec<Type>) -> Arc<Method> {
        let method = {
            let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
            let method = Arc::new(Method {
                id: MethodId(NEXT_METHOD_ID.fetch_add(1, Ordering::SeqCst)),
                function: function.to_string(),
                signature,
                world: advance_world(),
                table: self.name.clone(),
            });
            methods.push(Arc::clone(&method));
            method
        };
        let evicted = self.cache.evict_before(method.world);
        trace!(
            "{}: defined {} in {} (evicted {} cached)",
            self.name,
            method.signature_string(),
            method.world,
            evicted
        );
        method
    }

    /// Methods of `function` defined directly in this table.
    pub fn methods_of(&self, function: &str) -> Vec<Arc<Method>> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.function == function)
            .cloned()
            .collect()
    }

    /// Resolve `callable(arg_types...)` to its unique most specific method
    /// as of `world`.
    pub fn lookup(
        &self,
        callable: &Callable,
        arg_types: &[Type],
        world: WorldAge,
    ) -> Result<Specialization, ResolutionError> {
        let signature = || signature_string(callable.name(), arg_types);

        if let Some(ty) = arg_types.iter().find(|ty| !ty.is_concrete()) {
            return Err(ResolutionError::NonConcrete {
                signature: signature(),
                ty: ty.clone(),
            });
        }

        let method = match self.select(callable.name(), arg_types, world)? {
            Some(method) => method,
            None => {
                return Err(ResolutionError::NoMethod {
                    signature: signature(),
                    world,
                });
            }
        };

        debug!(
            "{}: {} -> {} ({})",
            self.name,
            signature(),
            method.signature_string(),
            world
        );

        Ok(Specialization {
            method,
            callable: callable.clone(),
            arg_types: arg_types.to_vec(),
            world,
        })
    }

    fn select(
        &self,
        function: &str,
        arg_types: &[Type],
        world: WorldAge,
    ) -> Result<Option<Arc<Method>>, ResolutionError> {
        let mut candidates: Vec<Arc<Method>> = Vec::new();
        {
            let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
            for method in methods.iter().filter(|m| m.applies_to(function, arg_types, world)) {
                // Redefinitions: keep the newest visible one.
                match candidates.iter_mut().find(|c| c.signature == method.signature) {
                    Some(existing) if existing.world < method.world => *existing = Arc::clone(method),
                    Some(_) => {}
                    None => candidates.push(Arc::clone(method)),
                }
            }
        }

        if candidates.is_empty() {
            return match &self.parent {
                Some(parent) => parent.select(function, arg_types, world),
                None => Ok(None),
            };
        }

        let mut minimal: Vec<Arc<Method>> = candidates
            .iter()
            .filter(|c| !candidates.iter().any(|d| d.is_more_specific(c)))
            .cloned()
            .collect();

        if minimal.len() == 1 {
            return Ok(minimal.pop());
        }

        Err(ResolutionError::Ambiguous {
            signature: signature_string(function, arg_types),
            candidates: minimal.iter().map(|m| m.signature_string()).collect(),
        })
    }
}

static DEFAULT_TABLE: OnceLock<Arc<MethodTable>> = OnceLock::new();

/// Install the process-wide default method table.
///
/// Can only happen once; a second call hands the rejected table back.
pub fn install_default_method_table(table: Arc<MethodTable>) -> Result<(), Arc<MethodTable>> {
    DEFAULT_TABLE.set(table)
}

/// The process-wide default method table, if one was installed.
pub fn default_method_table() -> Option<Arc<MethodTable>> {
    DEFAULT_TABLE.get().cloned()
}
