//! Backend target adapters
//!
//! The backend's generic pipeline consults a `CompilerTarget` for the
//! triple/cpu/features it compiles for, whether the code depends on the
//! managed runtime, which runtime module to link against, the cache slug
//! for compiled artifacts and where specializations come from.
//!
//! `StaticCompilerTarget` is the only kind. It snapshots a descriptor at job
//! build time, so later changes to the descriptor do not leak into a job.

use std::fmt;
use std::sync::Arc;

use log::trace;
use sha2::{Digest, Sha256};

use super::StaticParams;
use crate::backend::{API_GENERATION, ApiGeneration};
use crate::dispatch::{
    CachedLookup, InferenceParams, Interpreter, MethodTable, OptimizationParams,
    SpecializationSource, WorldAge,
};
use crate::runtime::{MANAGED_RUNTIME, MINIMAL_RUNTIME, RuntimeModule};
use crate::target::TargetDescriptor;

/// Closed set of adapter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Freestanding static compilation.
    Static,
}

/// How a target picks its runtime module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeSelection {
    /// Always the minimal module; the runtime flag is only reported.
    #[default]
    Minimal,
    /// The managed module when the runtime flag is set, minimal otherwise.
    FollowRuntimeFlag,
}

pub trait CompilerTarget: fmt::Debug {
    fn kind(&self) -> TargetKind;
    fn triple(&self) -> &str;
    fn cpu(&self) -> &str;
    fn features(&self) -> &str;
    fn uses_managed_runtime(&self) -> bool;

    fn runtime_module(&self, params: &StaticParams) -> &'static RuntimeModule;

    /// Identity of compiled artifacts for this target, used as cache key.
    fn runtime_slug(&self) -> String;

    /// Whether compiled code may use exception control flow.
    fn can_throw(&self) -> bool;

    fn method_table(&self) -> &Arc<MethodTable>;

    /// Specialization route for the configured backend API generation.
    fn specialization_source(&self, world: WorldAge) -> Box<dyn SpecializationSource + '_>;
}

/// Short hex digest of a feature string.
fn feature_hash(features: &str) -> String {
    let digest = Sha256::digest(features.as_bytes());
    hex::encode(&digest[..8])
}

#[derive(Debug)]
pub struct StaticCompilerTarget {
    triple: String,
    cpu: String,
    features: String,
    uses_managed_runtime: bool,
    runtime_selection: RuntimeSelection,
    method_table: Arc<MethodTable>,
}

impl StaticCompilerTarget {
    pub fn new(
        triple: impl Into<String>,
        cpu: impl Into<String>,
        features: impl Into<String>,
        uses_managed_runtime: bool,
        method_table: Arc<MethodTable>,
    ) -> Self {
        Self {
            triple: triple.into(),
            cpu: cpu.into(),
            features: features.into(),
            uses_managed_runtime,
            runtime_selection: RuntimeSelection::default(),
            method_table,
        }
    }

    /// Snapshot a descriptor. Identity comes from the target machine, not
    /// from the advisory platform.
    pub fn from_descriptor(target: &TargetDescriptor, method_table: Arc<MethodTable>) -> Self {
        let machine = target.target_machine();
        Self::new(
            machine.triple(),
            machine.cpu(),
            machine.features(),
            target.uses_managed_runtime(),
            method_table,
        )
    }

    pub fn with_runtime_selection(mut self, selection: RuntimeSelection) -> Self {
        self.runtime_selection = selection;
        self
    }

    pub fn runtime_selection(&self) -> RuntimeSelection {
        self.runtime_selection
    }

    /// Specialization route for an explicit API generation.
    pub fn source_for(
        &self,
        generation: ApiGeneration,
        world: WorldAge,
    ) -> Box<dyn SpecializationSource + '_> {
        let token = self.runtime_slug();
        trace!("static target: {:?} specialization route, token {}", generation, token);
        match generation {
            ApiGeneration::Current => Box::new(CachedLookup::new(&self.method_table, token, world)),
            ApiGeneration::Legacy => Box::new(Interpreter::new(
                world,
                Arc::clone(&self.method_table),
                token,
                InferenceParams::default(),
                OptimizationParams::default(),
            )),
        }
    }
}

impl CompilerTarget for StaticCompilerTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Static
    }

    fn triple(&self) -> &str {
        &self.triple
    }

    fn cpu(&self) -> &str {
        &self.cpu
    }

    fn features(&self) -> &str {
        &self.features
    }

    fn uses_managed_runtime(&self) -> bool {
        self.uses_managed_runtime
    }

    fn runtime_module(&self, params: &StaticParams) -> &'static RuntimeModule {
        if !params.is_freestanding() {
            return &MANAGED_RUNTIME;
        }
        match self.runtime_selection {
            RuntimeSelection::FollowRuntimeFlag if self.uses_managed_runtime => &MANAGED_RUNTIME,
            _ => &MINIMAL_RUNTIME,
        }
    }

    fn runtime_slug(&self) -> String {
        format!("static_{}-{}", self.cpu, feature_hash(&self.features))
    }

    fn can_throw(&self) -> bool {
        true
    }

    fn method_table(&self) -> &Arc<MethodTable> {
        &self.method_table
    }

    fn specialization_source(&self, world: WorldAge) -> Box<dyn SpecializationSource + '_> {
        self.source_for(API_GENERATION, world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Callable, Type, current_world};
    use pretty_assertions::assert_eq;

    fn target(cpu: &str, features: &str, managed: bool) -> StaticCompilerTarget {
        StaticCompilerTarget::new(
            "x86_64-linux-gnu",
            cpu,
            features,
            managed,
            Arc::new(MethodTable::new("test")),
        )
    }

    #[test]
    fn test_runtime_slug_identity() {
        let a = target("haswell", "+avx2", false);
        let b = target("haswell", "+avx2", true);
        assert_eq!(a.runtime_slug(), b.runtime_slug());
        assert!(a.runtime_slug().starts_with("static_haswell-"));

        assert_ne!(a.runtime_slug(), target("haswell", "+avx", false).runtime_slug());
        assert_ne!(a.runtime_slug(), target("skylake", "+avx2", false).runtime_slug());
    }

    #[test]
    fn test_runtime_module_selection() {
        let params = StaticParams;

        // Minimal regardless of the flag by default.
        assert!(std::ptr::eq(target("generic", "", true).runtime_module(&params), &MINIMAL_RUNTIME));
        assert!(std::ptr::eq(target("generic", "", false).runtime_module(&params), &MINIMAL_RUNTIME));

        let follow = |managed| {
            target("generic", "", managed).with_runtime_selection(RuntimeSelection::FollowRuntimeFlag)
        };
        assert!(std::ptr::eq(follow(true).runtime_module(&params), &MANAGED_RUNTIME));
        assert!(std::ptr::eq(follow(false).runtime_module(&params), &MINIMAL_RUNTIME));
    }

    #[test]
    fn test_static_target_can_throw() {
        let t = target("generic", "", false);
        assert!(t.can_throw());
        assert_eq!(t.kind(), TargetKind::Static);
    }

    #[test]
    fn test_both_specialization_routes_resolve() {
        let t = target("generic", "", false);
        t.method_table().define("inc", vec![Type::Integer]);
        let world = current_world();
        let inc = Callable::new("inc");

        let current = t.source_for(ApiGeneration::Current, world);
        let spec = current.specialize(&inc, &[Type::Int32]).unwrap();
        assert_eq!(spec.world, world);
        assert_eq!(t.method_table().code_cache().count_for(&t.runtime_slug()), 1);

        let legacy = t.source_for(ApiGeneration::Legacy, world);
        let again = legacy.specialize(&inc, &[Type::Int32]).unwrap();
        assert_eq!(again.method.id, spec.method.id);
        // The interpreter keeps its own cache.
        assert_eq!(t.method_table().code_cache().len(), 1);
    }
}
