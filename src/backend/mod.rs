//! Code generation backends
//!
//! The backend is the engine that turns a compilation job into machine code.
//! Job configuration only needs two things from it: a target machine built
//! from a (triple, cpu, features) request, and what it can discover about
//! the host.
//!
//! Architecture:
//! - `cranelift.rs` - Cranelift ISA target machines (default)
//! - `llvm/` - LLVM target machines (`llvm` feature)

pub mod cranelift;
#[cfg(feature = "llvm")]
pub mod llvm;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::target::TargetError;

/// CPU name meaning "baseline for the architecture".
pub const GENERIC_CPU: &str = "generic";

/// An opaque, backend-owned handle describing one concrete target.
///
/// Once built, its triple/cpu/features never change.
pub trait TargetMachine: fmt::Debug {
    /// Triple string exactly as handed to the backend.
    fn triple(&self) -> &str;
    fn cpu(&self) -> &str;
    fn features(&self) -> &str;
    fn backend(&self) -> BackendKind;
}

/// The slice of a code generation engine that target configuration talks to.
pub trait CodegenBackend: Sync {
    fn name(&self) -> &'static str;
    fn host_triple(&self) -> Result<String, TargetError>;
    fn host_cpu(&self) -> Result<String, TargetError>;
    fn host_features(&self) -> Result<String, TargetError>;

    /// Validate a request and build the machine for it.
    fn create_target_machine(
        &self,
        request: &TargetRequest,
    ) -> Result<Box<dyn TargetMachine>, TargetError>;
}

/// Input to target machine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    pub triple: String,
    pub cpu: String,
    pub features: String,
}

impl TargetRequest {
    pub fn new(
        triple: impl Into<String>,
        cpu: impl Into<String>,
        features: impl Into<String>,
    ) -> Self {
        Self {
            triple: triple.into(),
            cpu: cpu.into(),
            features: features.into(),
        }
    }

    /// Request for `triple` with the generic CPU and no extra features.
    pub fn generic(triple: impl Into<String>) -> Self {
        Self::new(triple, GENERIC_CPU, "")
    }
}

/// Available backends. Closed set; each variant maps to one static backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Cranelift,
    Llvm,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Cranelift => "cranelift",
            BackendKind::Llvm => "llvm",
        }
    }

    /// Resolve the backend implementation for this kind.
    pub fn backend(self) -> Result<&'static dyn CodegenBackend, TargetError> {
        match self {
            BackendKind::Cranelift => Ok(&cranelift::CraneliftBackend),
            #[cfg(feature = "llvm")]
            BackendKind::Llvm => Ok(&llvm::LlvmBackend),
            #[cfg(not(feature = "llvm"))]
            BackendKind::Llvm => Err(TargetError::BackendUnavailable("llvm")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Generation of the backend's specialization API.
///
/// `Current` backends take a code cache from the job parameters and accept
/// passthrough options at configuration time. `Legacy` backends need a fresh
/// interpreter per job and only see passthrough options at the later build
/// step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    Current,
    Legacy,
}

impl ApiGeneration {
    pub fn accepts_config_options(self) -> bool {
        matches!(self, ApiGeneration::Current)
    }
}

/// API generation this build was configured for.
pub const API_GENERATION: ApiGeneration = if cfg!(feature = "legacy-api") {
    ApiGeneration::Legacy
} else {
    ApiGeneration::Current
};

/// One `+name` / `-name` entry of a feature string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureToggle {
    pub name: String,
    pub enabled: bool,
}

/// Parse a comma separated `+feat,-feat` string.
///
/// An empty string is valid and yields no toggles.
pub fn parse_features(features: &str) -> Result<Vec<FeatureToggle>, TargetError> {
    let malformed = |reason: String| TargetError::MalformedFeatures {
        features: features.to_string(),
        reason,
    };

    if features.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut toggles = Vec::new();
    for entry in features.split(',') {
        let entry = entry.trim();
        let (enabled, name) = if let Some(name) = entry.strip_prefix('+') {
            (true, name)
        } else if let Some(name) = entry.strip_prefix('-') {
            (false, name)
        } else {
            return Err(malformed(format!("entry `{entry}` must start with `+` or `-`")));
        };

        if name.is_empty() {
            return Err(malformed("empty feature name".into()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(malformed(format!("invalid characters in `{name}`")));
        }

        toggles.push(FeatureToggle {
            name: name.to_string(),
            enabled,
        });
    }

    Ok(toggles)
}
