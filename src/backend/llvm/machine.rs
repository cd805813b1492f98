//! LLVM target machine handles
//!
//! Handles target machine creation and host discovery.

use std::ffi::{CStr, CString, c_char};
use std::fmt;
use std::ptr;
use std::sync::Once;

use llvm_sys::target_machine::*;
use log::debug;

use crate::backend::{BackendKind, TargetMachine, TargetRequest, parse_features};
use crate::target::TargetError;

static INIT_TARGETS: Once = Once::new();

/// Register every target LLVM was built with. Cross targets need more than
/// the native one.
fn initialize_targets() {
    INIT_TARGETS.call_once(|| unsafe {
        llvm_sys::target::LLVM_InitializeAllTargetInfos();
        llvm_sys::target::LLVM_InitializeAllTargets();
        llvm_sys::target::LLVM_InitializeAllTargetMCs();
        llvm_sys::target::LLVM_InitializeAllAsmPrinters();
        llvm_sys::target::LLVM_InitializeAllAsmParsers();
    });
}

/// Take ownership of an LLVM-allocated message.
///
/// # Safety
/// `message` must be null or a string allocated by LLVM that nothing else frees.
unsafe fn take_message(message: *mut c_char) -> Option<String> {
    if message.is_null() {
        return None;
    }
    unsafe {
        let text = CStr::from_ptr(message).to_string_lossy().into_owned();
        llvm_sys::core::LLVMDisposeMessage(message);
        Some(text)
    }
}

fn host_string(what: &str, message: *mut c_char) -> Result<String, TargetError> {
    unsafe { take_message(message) }
        .ok_or_else(|| TargetError::HostDetection(format!("Failed to get host {}", what)))
}

/// Get the default target triple for the current platform
pub fn get_default_target_triple() -> Result<String, TargetError> {
    host_string("target triple", unsafe { LLVMGetDefaultTargetTriple() })
}

pub fn get_host_cpu_name() -> Result<String, TargetError> {
    host_string("cpu name", unsafe { LLVMGetHostCPUName() })
}

pub fn get_host_cpu_features() -> Result<String, TargetError> {
    host_string("cpu features", unsafe { LLVMGetHostCPUFeatures() })
}

/// Exclusively owned `LLVMTargetMachineRef`, disposed on drop.
pub struct LlvmTargetMachine {
    raw: LLVMTargetMachineRef,
    triple: String,
    cpu: String,
    features: String,
}

impl LlvmTargetMachine {
    /// Create a target machine for the given request
    pub fn create(request: &TargetRequest) -> Result<Self, TargetError> {
        initialize_targets();
        parse_features(&request.features)?;

        let interior_nul = |what: &str, value: &str| TargetError::MachineCreation {
            backend: "llvm",
            triple: request.triple.clone(),
            reason: format!("{} `{}` contains a NUL byte", what, value),
        };
        let triple_cstr =
            CString::new(request.triple.as_str()).map_err(|_| interior_nul("triple", &request.triple))?;
        let cpu_cstr = CString::new(request.cpu.as_str()).map_err(|_| interior_nul("cpu", &request.cpu))?;
        let features_cstr = CString::new(request.features.as_str())
            .map_err(|_| interior_nul("features", &request.features))?;

        unsafe {
            let mut target: LLVMTargetRef = ptr::null_mut();
            let mut error_msg: *mut c_char = ptr::null_mut();

            if LLVMGetTargetFromTriple(triple_cstr.as_ptr(), &mut target, &mut error_msg) != 0 {
                let reason = take_message(error_msg).unwrap_or_else(|| "Unknown error".to_string());
                return Err(TargetError::UnsupportedTriple {
                    triple: request.triple.clone(),
                    reason,
                });
            }

            let raw = LLVMCreateTargetMachine(
                target,
                triple_cstr.as_ptr(),
                cpu_cstr.as_ptr(),
                features_cstr.as_ptr(),
                LLVMCodeGenOptLevel::LLVMCodeGenLevelDefault,
                LLVMRelocMode::LLVMRelocPIC,
                LLVMCodeModel::LLVMCodeModelDefault,
            );

            if raw.is_null() {
                return Err(TargetError::MachineCreation {
                    backend: "llvm",
                    triple: request.triple.clone(),
                    reason: "Failed to create target machine".into(),
                });
            }

            // Read back what LLVM recorded rather than trusting the request.
            let triple = take_message(LLVMGetTargetMachineTriple(raw)).unwrap_or_else(|| request.triple.clone());
            let cpu = take_message(LLVMGetTargetMachineCPU(raw)).unwrap_or_else(|| request.cpu.clone());
            let features = take_message(LLVMGetTargetMachineFeatureString(raw))
                .unwrap_or_else(|| request.features.clone());

            debug!("llvm: created target machine for {} (cpu={})", triple, cpu);

            Ok(Self {
                raw,
                triple,
                cpu,
                features,
            })
        }
    }

    pub fn as_raw(&self) -> LLVMTargetMachineRef {
        self.raw
    }
}

impl Drop for LlvmTargetMachine {
    fn drop(&mut self) {
        unsafe { LLVMDisposeTargetMachine(self.raw) }
    }
}

impl fmt::Debug for LlvmTargetMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlvmTargetMachine")
            .field("triple", &self.triple)
            .field("cpu", &self.cpu)
            .field("features", &self.features)
            .finish()
    }
}

impl TargetMachine for LlvmTargetMachine {
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
        BackendKind::Llvm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_target_triple() {
        let triple = get_default_target_triple().unwrap();
        assert!(!triple.is_empty());
    }

    #[test]
    fn test_create_generic_machine() {
        let machine = LlvmTargetMachine::create(&TargetRequest::generic("x86_64-linux-gnu")).unwrap();
        assert_eq!(machine.triple(), "x86_64-linux-gnu");
        assert_eq!(machine.cpu(), "generic");
    }

    #[test]
    fn test_unknown_triple_fails() {
        let err = LlvmTargetMachine::create(&TargetRequest::generic("bogus-none-none")).unwrap_err();
        assert!(matches!(err, TargetError::UnsupportedTriple { .. }));
    }
}
