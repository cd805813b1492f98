//! LLVM backend module root
//!
//! Target machines backed by `LLVMTargetMachineRef`. LLVM only warns about
//! CPU names it does not know, so CPU validation for this backend is LLVM's
//! own; triples and feature-string syntax are still rejected up front.

// Allow these for LLVM FFI code
#![allow(clippy::manual_c_str_literals)]
#![allow(clippy::missing_safety_doc)]

pub mod machine;

pub use machine::LlvmTargetMachine;

use crate::backend::{CodegenBackend, TargetMachine, TargetRequest};
use crate::target::TargetError;

/// LLVM backend
pub struct LlvmBackend;

impl CodegenBackend for LlvmBackend {
    fn name(&self) -> &'static str {
        "llvm"
    }

    fn host_triple(&self) -> Result<String, TargetError> {
        machine::get_default_target_triple()
    }

    fn host_cpu(&self) -> Result<String, TargetError> {
        machine::get_host_cpu_name()
    }

    fn host_features(&self) -> Result<String, TargetError> {
        machine::get_host_cpu_features()
    }

    fn create_target_machine(
        &self,
        request: &TargetRequest,
    ) -> Result<Box<dyn TargetMachine>, TargetError> {
        Ok(Box::new(LlvmTargetMachine::create(request)?))
    }
}
