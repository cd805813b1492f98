//! Compilation job assembly
//!
//! `build_job` is the entry point: it resolves a callable and its argument
//! types to a specialization, derives a `StaticCompilerTarget` from a target
//! descriptor, and packages both with freestanding-mode parameters and the
//! job-level options into a `CompilerJob` for the backend.
//!
//! Passthrough options are split in two. Backends of the current API
//! generation take the recognized configuration keys at configuration time;
//! whatever is left (everything, for legacy backends) comes back to the
//! caller as residual options for the later build step.

pub mod target;

pub use target::{CompilerTarget, RuntimeSelection, StaticCompilerTarget, TargetKind};

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::backend::{API_GENERATION, ApiGeneration};
use crate::dispatch::{
    Callable, MethodTable, ResolutionError, Specialization, SpecializationSource, Type, WorldAge,
    current_world, default_method_table,
};
use crate::runtime::RuntimeModule;
use crate::target::{TargetDescriptor, TargetError};

/// Passthrough options, by name.
pub type OptionMap = BTreeMap<String, Value>;

/// Option keys a current-generation backend accepts at configuration time.
/// Link-step keys (`cflags`, `libraries`) always stay residual.
pub const CONFIG_OPTIONS: &[&str] = &["always_inline", "entry_abi", "optimize", "strip", "validate"];

/// Errors from `build_job`, tagged by the stage that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("specialization resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("adapter derivation failed: no method table given and no default installed")]
    NoMethodTable,
}

/// Job parameters. Their only content is the compilation mode, which is
/// always freestanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticParams;

impl StaticParams {
    pub fn is_freestanding(&self) -> bool {
        true
    }
}

/// Options recognized by `build_job`.
#[derive(Debug, Default)]
pub struct JobOptions<'a> {
    /// Symbol name; defaults to the sanitized callable name.
    pub name: Option<String>,
    /// Device/entry kernel rather than an ordinary function.
    pub kernel: bool,
    /// Defaults to the host descriptor.
    pub target: Option<&'a TargetDescriptor>,
    /// Defaults to the installed process-wide table.
    pub method_table: Option<Arc<MethodTable>>,
    pub runtime_selection: RuntimeSelection,
    /// Passthrough options for the backend.
    pub extra: OptionMap,
}

impl<'a> JobOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kernel(mut self, kernel: bool) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn target(mut self, target: &'a TargetDescriptor) -> Self {
        self.target = Some(target);
        self
    }

    pub fn method_table(mut self, table: Arc<MethodTable>) -> Self {
        self.method_table = Some(table);
        self
    }

    pub fn runtime_selection(mut self, selection: RuntimeSelection) -> Self {
        self.runtime_selection = selection;
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Everything the backend's configuration step receives.
#[derive(Debug)]
pub struct CompilerConfig {
    pub target: StaticCompilerTarget,
    pub params: StaticParams,
    pub name: String,
    pub kernel: bool,
    pub options: OptionMap,
}

/// A backend-ready job. Consumed once, by `into_parts`.
#[derive(Debug)]
pub struct CompilerJob {
    source: Specialization,
    config: CompilerConfig,
    world: WorldAge,
}

impl CompilerJob {
    pub fn source(&self) -> &Specialization {
        &self.source
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn target(&self) -> &StaticCompilerTarget {
        &self.config.target
    }

    pub fn params(&self) -> &StaticParams {
        &self.config.params
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_kernel(&self) -> bool {
        self.config.kernel
    }

    pub fn world(&self) -> WorldAge {
        self.world
    }

    pub fn runtime_module(&self) -> &'static RuntimeModule {
        self.config.target.runtime_module(&self.config.params)
    }

    /// Where the backend resolves calls made by the compiled code.
    pub fn specialization_source(&self) -> Box<dyn SpecializationSource + '_> {
        self.config.target.specialization_source(self.world)
    }

    pub fn into_parts(self) -> (Specialization, CompilerConfig) {
        (self.source, self.config)
    }
}

/// Turn a callable name into a valid symbol: anything outside
/// `[A-Za-z0-9_]` becomes `_`, and a leading digit gets a `_` prefix.
pub fn safe_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        return "anonymous".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Split passthrough options into (configuration, residual).
pub fn split_options(extra: OptionMap, generation: ApiGeneration) -> (OptionMap, OptionMap) {
    if !generation.accepts_config_options() {
        return (OptionMap::new(), extra);
    }
    extra
        .into_iter()
        .partition(|(key, _)| CONFIG_OPTIONS.contains(&key.as_str()))
}

/// Assemble a compilation job for `callable(arg_types...)`.
pub fn build_job(
    callable: &Callable,
    arg_types: &[Type],
    options: JobOptions<'_>,
) -> Result<(CompilerJob, OptionMap), JobError> {
    let JobOptions {
        name,
        kernel,
        target,
        method_table,
        runtime_selection,
        extra,
    } = options;

    let method_table = method_table
        .or_else(default_method_table)
        .ok_or(JobError::NoMethodTable)?;

    let world = current_world();
    let source = method_table.lookup(callable, arg_types, world)?;

    let host;
    let target = match target {
        Some(target) => target,
        None => {
            host = TargetDescriptor::host()?;
            &host
        }
    };

    let adapter = StaticCompilerTarget::from_descriptor(target, method_table)
        .with_runtime_selection(runtime_selection);
    let (config_options, residual) = split_options(extra, API_GENERATION);
    let name = name.unwrap_or_else(|| safe_name(callable.name()));

    debug!(
        "job: {} as `{}` for {} (cpu={}, slug={}, kernel={}, residual={:?})",
        source.signature_string(),
        name,
        adapter.triple(),
        adapter.cpu(),
        adapter.runtime_slug(),
        kernel,
        residual.keys().collect::<Vec<_>>()
    );

    let job = CompilerJob {
        source,
        config: CompilerConfig {
            target: adapter,
            params: StaticParams,
            name,
            kernel,
            options: config_options,
        },
        world,
    };

    Ok((job, residual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("add_one"), "add_one");
        assert_eq!(safe_name("push!"), "push_");
        assert_eq!(safe_name("#kw#f"), "_kw_f");
        assert_eq!(safe_name("2x"), "_2x");
        assert_eq!(safe_name(""), "anonymous");
    }

    #[test]
    fn test_split_options_current() {
        let mut extra = OptionMap::new();
        extra.insert("strip".into(), json!(true));
        extra.insert("libraries".into(), json!(["m"]));
        extra.insert("cflags".into(), json!("-O2"));

        let (config, residual) = split_options(extra, ApiGeneration::Current);
        assert_eq!(config.keys().collect::<Vec<_>>(), vec!["strip"]);
        assert_eq!(residual.keys().collect::<Vec<_>>(), vec!["cflags", "libraries"]);
    }

    #[test]
    fn test_split_options_legacy_returns_everything() {
        let mut extra = OptionMap::new();
        extra.insert("strip".into(), json!(true));
        extra.insert("cflags".into(), json!("-O2"));

        let (config, residual) = split_options(extra.clone(), ApiGeneration::Legacy);
        assert!(config.is_empty());
        assert_eq!(residual, extra);
    }

    #[test]
    fn test_job_options_builder() {
        let options = JobOptions::new()
            .name("entry")
            .kernel(true)
            .runtime_selection(RuntimeSelection::FollowRuntimeFlag)
            .option("validate", false);
        assert_eq!(options.name.as_deref(), Some("entry"));
        assert!(options.kernel);
        assert_eq!(options.runtime_selection, RuntimeSelection::FollowRuntimeFlag);
        assert_eq!(options.extra.get("validate"), Some(&json!(false)));
    }
}
