//! Compilation target descriptors
//!
//! A `TargetDescriptor` identifies what a job compiles for: the triple, CPU
//! and feature string baked into an exclusively owned backend target
//! machine, plus two pieces of configuration that may change after
//! construction (the external cross compiler and whether the compiled code
//! depends on the managed runtime).
//!
//! The target machine is built once in the constructor and never rebuilt
//! implicitly. `rebuild` is the only way to get a second one.

pub mod error;
pub mod platform;

pub use error::TargetError;
pub use platform::{Arch, CallAbi, Libc, Os, Platform, clean_triple};

use std::path::{Path, PathBuf};

use log::debug;

use crate::backend::{BackendKind, GENERIC_CPU, TargetMachine, TargetRequest};

/// Where the triple of a descriptor comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripleSource {
    /// Whatever the backend reports for the host.
    Host,
    /// `clean_triple` of a platform.
    Platform(Platform),
    /// A raw triple string, used verbatim.
    Raw(String),
}

/// Full description of a target to construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub triple: TripleSource,
    /// `None` means the host CPU for host triples and `generic` otherwise.
    pub cpu: Option<String>,
    /// `None` means the host features for host triples and none otherwise.
    pub features: Option<String>,
}

impl TargetSpec {
    pub fn host() -> Self {
        Self {
            triple: TripleSource::Host,
            cpu: None,
            features: None,
        }
    }
}

/// Target of a compilation job.
#[derive(Debug)]
pub struct TargetDescriptor {
    platform: Option<Platform>,
    machine: Box<dyn TargetMachine>,
    compiler: Option<PathBuf>,
    uses_managed_runtime: bool,
}

impl TargetDescriptor {
    /// Construct a descriptor on an explicit backend.
    pub fn new(backend: BackendKind, spec: TargetSpec) -> Result<Self, TargetError> {
        let backend = backend.backend()?;

        let (request, platform) = match spec.triple {
            TripleSource::Host => {
                let triple = backend.host_triple()?;
                let cpu = match spec.cpu {
                    Some(cpu) => cpu,
                    None => backend.host_cpu()?,
                };
                let features = match spec.features {
                    Some(features) => features,
                    None => backend.host_features()?,
                };
                let platform = Platform::parse(&triple);
                (TargetRequest::new(triple, cpu, features), platform)
            }
            TripleSource::Platform(platform) => (
                TargetRequest::new(
                    clean_triple(&platform),
                    spec.cpu.unwrap_or_else(|| GENERIC_CPU.to_string()),
                    spec.features.unwrap_or_default(),
                ),
                Some(platform),
            ),
            TripleSource::Raw(triple) => {
                let platform = Platform::parse(&triple);
                (
                    TargetRequest::new(
                        triple,
                        spec.cpu.unwrap_or_else(|| GENERIC_CPU.to_string()),
                        spec.features.unwrap_or_default(),
                    ),
                    platform,
                )
            }
        };

        let machine = backend.create_target_machine(&request)?;
        debug!(
            "target: {} descriptor for {} (cpu={}, platform={:?})",
            backend.name(),
            machine.triple(),
            machine.cpu(),
            platform
        );

        Ok(Self {
            platform,
            machine,
            compiler: None,
            uses_managed_runtime: false,
        })
    }

    /// Host-native target: host triple, host CPU and host features.
    pub fn host() -> Result<Self, TargetError> {
        Self::new(BackendKind::default(), TargetSpec::host())
    }

    /// Target for `platform` with the generic CPU.
    pub fn from_platform(platform: Platform) -> Result<Self, TargetError> {
        Self::new(
            BackendKind::default(),
            TargetSpec {
                triple: TripleSource::Platform(platform),
                cpu: None,
                features: None,
            },
        )
    }

    /// Target for `platform` pinned to `cpu`, default features.
    pub fn with_cpu(platform: Platform, cpu: &str) -> Result<Self, TargetError> {
        Self::new(
            BackendKind::default(),
            TargetSpec {
                triple: TripleSource::Platform(platform),
                cpu: Some(cpu.to_string()),
                features: None,
            },
        )
    }

    /// Target for `platform` pinned to `cpu` with an explicit feature string.
    pub fn with_features(platform: Platform, cpu: &str, features: &str) -> Result<Self, TargetError> {
        Self::new(
            BackendKind::default(),
            TargetSpec {
                triple: TripleSource::Platform(platform),
                cpu: Some(cpu.to_string()),
                features: Some(features.to_string()),
            },
        )
    }

    /// Target for a raw triple string.
    ///
    /// The triple is used verbatim for code generation; `platform()` is only
    /// set when the triple parses into a known platform.
    pub fn from_triple(triple: &str, cpu: &str, features: &str) -> Result<Self, TargetError> {
        Self::new(
            BackendKind::default(),
            TargetSpec {
                triple: TripleSource::Raw(triple.to_string()),
                cpu: Some(cpu.to_string()),
                features: Some(features.to_string()),
            },
        )
    }

    /// Build a fresh descriptor with a new target machine for the same
    /// triple, CPU and features. Compiler path and runtime flag carry over.
    pub fn rebuild(&self) -> Result<Self, TargetError> {
        let machine = self
            .machine
            .backend()
            .backend()?
            .create_target_machine(&TargetRequest::new(self.triple(), self.cpu(), self.features()))?;
        Ok(Self {
            platform: self.platform,
            machine,
            compiler: self.compiler.clone(),
            uses_managed_runtime: self.uses_managed_runtime,
        })
    }

    /// Set the external C compiler used for cross linking. Not validated here.
    pub fn set_compiler(&mut self, path: impl Into<PathBuf>) {
        self.compiler = Some(path.into());
    }

    pub fn set_runtime(&mut self, uses_managed_runtime: bool) {
        self.uses_managed_runtime = uses_managed_runtime;
    }

    pub fn compiler(&self) -> Option<&Path> {
        self.compiler.as_deref()
    }

    pub fn uses_managed_runtime(&self) -> bool {
        self.uses_managed_runtime
    }

    /// Advisory platform identity; `None` for unrecognized raw triples.
    pub fn platform(&self) -> Option<Platform> {
        self.platform
    }

    pub fn target_machine(&self) -> &dyn TargetMachine {
        self.machine.as_ref()
    }

    pub fn backend(&self) -> BackendKind {
        self.machine.backend()
    }

    pub fn triple(&self) -> &str {
        self.machine.triple()
    }

    pub fn cpu(&self) -> &str {
        self.machine.cpu()
    }

    pub fn features(&self) -> &str {
        self.machine.features()
    }

    /// Whether code for this target runs on the machine doing the compiling.
    pub fn is_host(&self) -> bool {
        let host = match self.machine.backend().backend().and_then(|b| b.host_triple()) {
            Ok(host) => host,
            Err(_) => return false,
        };
        if host == self.triple() {
            return true;
        }
        match (self.platform, Platform::parse(&host)) {
            (Some(ours), Some(host)) => ours == host,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_host_descriptor_is_deterministic() {
        let a = TargetDescriptor::host().unwrap();
        let b = TargetDescriptor::host().unwrap();
        assert_eq!(a.triple(), b.triple());
        assert_eq!(a.cpu(), b.cpu());
        assert_eq!(a.features(), b.features());
        assert!(a.is_host());
    }

    #[test]
    fn test_from_platform_uses_generic_cpu() {
        let platform = Platform::new(Arch::X86_64, Os::Linux);
        let target = TargetDescriptor::from_platform(platform).unwrap();
        assert_eq!(target.triple(), "x86_64-linux-gnu");
        assert_eq!(target.cpu(), GENERIC_CPU);
        assert_eq!(target.features(), "");
        assert_eq!(target.platform(), Some(platform));
    }

    #[test]
    fn test_with_cpu_and_features() {
        let platform = Platform::new(Arch::X86_64, Os::Linux);
        let target = TargetDescriptor::with_cpu(platform, "haswell").unwrap();
        assert_eq!(target.cpu(), "haswell");
        assert_eq!(target.features(), "");

        let target = TargetDescriptor::with_features(platform, "haswell", "+avx,+avx2").unwrap();
        assert_eq!(target.features(), "+avx,+avx2");
    }

    #[test]
    fn test_constructor_failures_name_the_identifier() {
        let platform = Platform::new(Arch::X86_64, Os::Linux);

        let err = TargetDescriptor::with_cpu(platform, "pentium-9000").unwrap_err();
        assert!(err.to_string().contains("pentium-9000"));

        let err = TargetDescriptor::with_features(platform, "generic", "avx2").unwrap_err();
        assert!(matches!(err, TargetError::MalformedFeatures { .. }));

        let err = TargetDescriptor::from_platform(Platform::new(Arch::Armv7l, Os::Linux)).unwrap_err();
        assert!(err.to_string().contains("armv7l-linux-gnueabihf"));
    }

    #[test]
    fn test_raw_triple_platform_is_advisory() {
        let target = TargetDescriptor::from_triple("x86_64-unknown-linux-gnu", "generic", "").unwrap();
        assert_eq!(target.triple(), "x86_64-unknown-linux-gnu");
        assert_eq!(target.platform(), Some(Platform::new(Arch::X86_64, Os::Linux)));

        // Parses for Cranelift but is outside the modelled platforms.
        let target = TargetDescriptor::from_triple("x86_64-unknown-none-elf", "generic", "").unwrap();
        assert_eq!(target.platform(), None);
        assert_eq!(target.triple(), "x86_64-unknown-none-elf");
    }

    #[test]
    fn test_setters_observe_last_value() {
        let mut target = TargetDescriptor::from_platform(Platform::new(Arch::Aarch64, Os::Linux)).unwrap();
        assert_eq!(target.compiler(), None);
        assert!(!target.uses_managed_runtime());

        target.set_compiler("/opt/cross/bin/aarch64-linux-gnu-gcc");
        target.set_compiler("/usr/bin/aarch64-linux-gnu-gcc");
        assert_eq!(target.compiler(), Some(Path::new("/usr/bin/aarch64-linux-gnu-gcc")));

        target.set_runtime(true);
        assert!(target.uses_managed_runtime());
        target.set_runtime(false);
        assert!(!target.uses_managed_runtime());
    }

    #[test]
    fn test_rebuild_keeps_identity_and_configuration() {
        let mut target = TargetDescriptor::with_features(
            Platform::new(Arch::X86_64, Os::Linux),
            "haswell",
            "+avx,+avx2",
        )
        .unwrap();
        target.set_compiler("x86_64-linux-gnu-gcc");
        target.set_runtime(true);

        let copy = target.rebuild().unwrap();
        assert_eq!(copy.triple(), target.triple());
        assert_eq!(copy.cpu(), target.cpu());
        assert_eq!(copy.features(), target.features());
        assert_eq!(copy.compiler(), target.compiler());
        assert!(copy.uses_managed_runtime());
    }

    #[cfg(not(feature = "llvm"))]
    #[test]
    fn test_llvm_backend_unavailable() {
        let err = TargetDescriptor::new(BackendKind::Llvm, TargetSpec::host()).unwrap_err();
        assert_eq!(err, TargetError::BackendUnavailable("llvm"));
    }
}
