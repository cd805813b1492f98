//! Cranelift target machines
//!
//! Target machines are Cranelift ISAs. The triple goes through
//! `target-lexicon` and `isa::lookup`, CPU names select ISA presets and
//! feature toggles map onto the ISA's `has_*` flags, so every part of the
//! request is validated by Cranelift itself.

use std::fmt;
use std::str::FromStr;

use cranelift_codegen::isa::{self, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable, SetError};
use log::{debug, trace};
use target_lexicon::Triple;

use super::{BackendKind, CodegenBackend, GENERIC_CPU, TargetMachine, TargetRequest, parse_features};
use crate::target::TargetError;

/// CPU name selecting host detection through `cranelift-native`.
///
/// Cranelift has no CPU model names, only presets and per-feature flags, so
/// this is also what the backend reports as the host CPU. Host machines are
/// told apart by their detected feature string, which always enters the
/// runtime slug next to the CPU.
pub const NATIVE_CPU: &str = "native";

/// Cranelift backend
pub struct CraneliftBackend;

/// A finished Cranelift ISA plus the request it was built from.
pub struct CraneliftTargetMachine {
    triple: String,
    cpu: String,
    features: String,
    isa: OwnedTargetIsa,
}

impl CraneliftTargetMachine {
    /// The underlying ISA, for code generation.
    pub fn isa(&self) -> &OwnedTargetIsa {
        &self.isa
    }
}

impl fmt::Debug for CraneliftTargetMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CraneliftTargetMachine")
            .field("triple", &self.triple)
            .field("cpu", &self.cpu)
            .field("features", &self.features)
            .field("isa", &self.isa.name())
            .finish()
    }
}

impl TargetMachine for CraneliftTargetMachine {
    fn triple(&self) -> &str {
        &self.triple
    }

    fn cpu(&self) -> &str {
        &self.cpu
    }

    fn features(&self) -> &str {
        &self.features
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Cranelift
    }
}

/// Map a feature name to the ISA flag controlling it (`sse4.1` -> `has_sse41`).
fn isa_flag_name(feature: &str) -> String {
    format!("has_{}", feature.replace('.', "").replace('-', "_"))
}

/// Render the enabled `has_*` flags of an ISA as a feature string.
fn feature_string(isa: &OwnedTargetIsa) -> String {
    isa.isa_flags()
        .iter()
        .filter(|value| value.as_bool() == Some(true))
        .filter_map(|value| value.name.strip_prefix("has_"))
        .map(|name| format!("+{name}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn host_isa() -> Result<OwnedTargetIsa, TargetError> {
    let builder = cranelift_native::builder()
        .map_err(|e| TargetError::HostDetection(format!("Failed to create ISA builder: {}", e)))?;
    builder
        .finish(settings::Flags::new(settings::builder()))
        .map_err(|e| TargetError::HostDetection(format!("Failed to create ISA: {}", e)))
}

impl CodegenBackend for CraneliftBackend {
    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn host_triple(&self) -> Result<String, TargetError> {
        Ok(Triple::host().to_string())
    }

    /// Always `native`; see `NATIVE_CPU`.
    fn host_cpu(&self) -> Result<String, TargetError> {
        Ok(NATIVE_CPU.to_string())
    }

    fn host_features(&self) -> Result<String, TargetError> {
        Ok(feature_string(&host_isa()?))
    }

    fn create_target_machine(
        &self,
        request: &TargetRequest,
    ) -> Result<Box<dyn TargetMachine>, TargetError> {
        let unsupported = |reason: String| TargetError::UnsupportedTriple {
            triple: request.triple.clone(),
            reason,
        };

        let triple = Triple::from_str(&request.triple).map_err(|e| unsupported(e.to_string()))?;
        let is_host = triple == Triple::host();

        let mut builder = if request.cpu == NATIVE_CPU {
            if !is_host {
                return Err(TargetError::InvalidCpu {
                    triple: request.triple.clone(),
                    cpu: request.cpu.clone(),
                    reason: "host detection is only available for the host triple".into(),
                });
            }
            cranelift_native::builder().map_err(|e| TargetError::HostDetection(e.to_string()))?
        } else {
            isa::lookup(triple).map_err(|e| unsupported(e.to_string()))?
        };

        if !request.cpu.is_empty() && request.cpu != GENERIC_CPU && request.cpu != NATIVE_CPU {
            builder
                .enable(&request.cpu)
                .map_err(|e| TargetError::InvalidCpu {
                    triple: request.triple.clone(),
                    cpu: request.cpu.clone(),
                    reason: e.to_string(),
                })?;
        }

        for toggle in parse_features(&request.features)? {
            let flag = isa_flag_name(&toggle.name);
            trace!("cranelift: {} = {}", flag, toggle.enabled);
            let result = if toggle.enabled {
                builder.enable(&flag)
            } else {
                builder.set(&flag, "false")
            };
            match result {
                Ok(()) => {}
                Err(SetError::BadName(_)) => {
                    return Err(TargetError::UnknownFeature {
                        triple: request.triple.clone(),
                        feature: toggle.name,
                    });
                }
                Err(e) => {
                    return Err(TargetError::MalformedFeatures {
                        features: request.features.clone(),
                        reason: format!("{}: {}", toggle.name, e),
                    });
                }
            }
        }

        let isa = builder
            .finish(settings::Flags::new(settings::builder()))
            .map_err(|e| TargetError::MachineCreation {
                backend: self.name(),
                triple: request.triple.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            "cranelift: built {} machine for {} (cpu={}, features={:?})",
            isa.name(),
            request.triple,
            request.cpu,
            request.features
        );

        Ok(Box::new(CraneliftTargetMachine {
            triple: request.triple.clone(),
            cpu: request.cpu.clone(),
            features: request.features.clone(),
            isa,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isa_flag_name() {
        assert_eq!(isa_flag_name("sse4.1"), "has_sse41");
        assert_eq!(isa_flag_name("avx2"), "has_avx2");
        assert_eq!(isa_flag_name("lse"), "has_lse");
    }

    #[test]
    fn test_generic_x86_64_machine() {
        let machine = CraneliftBackend
            .create_target_machine(&TargetRequest::generic("x86_64-linux-gnu"))
            .unwrap();
        assert_eq!(machine.triple(), "x86_64-linux-gnu");
        assert_eq!(machine.cpu(), GENERIC_CPU);
        assert_eq!(machine.features(), "");
        assert_eq!(machine.backend(), BackendKind::Cranelift);
    }

    #[test]
    fn test_cpu_preset_and_features() {
        let request = TargetRequest::new("x86_64-unknown-linux-gnu", "haswell", "+avx,+avx2,-bmi2");
        let machine = CraneliftBackend.create_target_machine(&request).unwrap();
        assert_eq!(machine.cpu(), "haswell");
        assert_eq!(machine.features(), "+avx,+avx2,-bmi2");
    }

    #[test]
    fn test_aarch64_machine() {
        let machine = CraneliftBackend
            .create_target_machine(&TargetRequest::new("aarch64-apple-darwin", "generic", "+lse"))
            .unwrap();
        assert_eq!(machine.triple(), "aarch64-apple-darwin");
    }

    #[test]
    fn test_invalid_cpu() {
        let err = CraneliftBackend
            .create_target_machine(&TargetRequest::new("x86_64-linux-gnu", "not-a-cpu", ""))
            .unwrap_err();
        assert!(matches!(err, TargetError::InvalidCpu { ref cpu, .. } if cpu == "not-a-cpu"));
    }

    #[test]
    fn test_unknown_feature() {
        let err = CraneliftBackend
            .create_target_machine(&TargetRequest::new("x86_64-linux-gnu", "generic", "+warp_drive"))
            .unwrap_err();
        assert!(matches!(err, TargetError::UnknownFeature { ref feature, .. } if feature == "warp_drive"));
    }

    #[test]
    fn test_unsupported_triples() {
        for triple in ["not-a-triple", "armv7l-linux-gnueabihf"] {
            let err = CraneliftBackend
                .create_target_machine(&TargetRequest::generic(triple))
                .unwrap_err();
            assert!(
                matches!(err, TargetError::UnsupportedTriple { .. }),
                "{triple}: {err}"
            );
        }
    }

    #[test]
    fn test_native_cpu_requires_host_triple() {
        let foreign = if Triple::host().architecture.to_string() == "x86_64" {
            "aarch64-linux-gnu"
        } else {
            "x86_64-linux-gnu"
        };
        let err = CraneliftBackend
            .create_target_machine(&TargetRequest::new(foreign, NATIVE_CPU, ""))
            .unwrap_err();
        assert!(matches!(err, TargetError::InvalidCpu { .. }));
    }

    #[test]
    fn test_host_machine_reports_native_cpu_and_detected_features() {
        let backend = CraneliftBackend;
        assert_eq!(backend.host_cpu().unwrap(), NATIVE_CPU);

        let request = TargetRequest::new(
            backend.host_triple().unwrap(),
            backend.host_cpu().unwrap(),
            backend.host_features().unwrap(),
        );
        let machine = backend.create_target_machine(&request).unwrap();
        assert_eq!(machine.cpu(), NATIVE_CPU);
        assert_eq!(machine.features(), backend.host_features().unwrap());
    }

    #[test]
    fn test_host_discovery_is_deterministic() {
        let backend = CraneliftBackend;
        assert_eq!(backend.host_triple().unwrap(), backend.host_triple().unwrap());
        assert_eq!(backend.host_features().unwrap(), backend.host_features().unwrap());
    }
}
