//! Runtime support modules for compiled code
//!
//! The backend expects a runtime module providing a fixed set of support
//! routines (exception signaling and reporting, allocation, out-of-memory
//! reporting). Freestanding jobs get `MINIMAL_RUNTIME`, whose routines live
//! in `stubs.rs` and do nothing except forward allocation to `malloc`.
//! `MANAGED_RUNTIME` names the same routine set as provided by the full
//! managed runtime; this crate never implements it.

pub mod stubs;

use std::fmt;

/// C-level types appearing in runtime routine signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    Void,
    Size,
    CInt,
    Ptr,
}

/// One support routine the backend may emit calls to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeRoutine {
    /// Name the backend knows the routine by.
    pub name: &'static str,
    /// Linker symbol implementing it.
    pub symbol: &'static str,
    pub params: &'static [AbiType],
    pub ret: AbiType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeProvider {
    /// Implemented by this crate.
    Builtin,
    /// Supplied by the managed runtime at link time.
    External,
}

/// A named bundle of runtime routines.
#[derive(Debug, PartialEq, Eq)]
pub struct RuntimeModule {
    pub name: &'static str,
    pub provider: RuntimeProvider,
    pub routines: &'static [RuntimeRoutine],
}

pub const SIGNAL_EXCEPTION: &str = "signal_exception";
pub const GC_POOL_ALLOC: &str = "gc_pool_alloc";
pub const REPORT_OOM: &str = "report_oom";
pub const REPORT_EXCEPTION: &str = "report_exception";
pub const REPORT_EXCEPTION_NAME: &str = "report_exception_name";
pub const REPORT_EXCEPTION_FRAME: &str = "report_exception_frame";

/// The freestanding runtime.
pub static MINIMAL_RUNTIME: RuntimeModule = RuntimeModule {
    name: "minimal",
    provider: RuntimeProvider::Builtin,
    routines: &[
        RuntimeRoutine {
            name: SIGNAL_EXCEPTION,
            symbol: "freestand_signal_exception",
            params: &[],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: GC_POOL_ALLOC,
            symbol: "freestand_gc_pool_alloc",
            params: &[AbiType::Size],
            ret: AbiType::Ptr,
        },
        RuntimeRoutine {
            name: REPORT_OOM,
            symbol: "freestand_report_oom",
            params: &[AbiType::Size],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: REPORT_EXCEPTION,
            symbol: "freestand_report_exception",
            params: &[AbiType::Ptr],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: REPORT_EXCEPTION_NAME,
            symbol: "freestand_report_exception_name",
            params: &[AbiType::Ptr],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: REPORT_EXCEPTION_FRAME,
            symbol: "freestand_report_exception_frame",
            params: &[AbiType::CInt, AbiType::Ptr, AbiType::Ptr, AbiType::CInt],
            ret: AbiType::Void,
        },
    ],
};

/// The full managed runtime, resolved by the linker.
pub static MANAGED_RUNTIME: RuntimeModule = RuntimeModule {
    name: "managed",
    provider: RuntimeProvider::External,
    routines: &[
        RuntimeRoutine {
            name: SIGNAL_EXCEPTION,
            symbol: SIGNAL_EXCEPTION,
            params: &[],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: GC_POOL_ALLOC,
            symbol: GC_POOL_ALLOC,
            params: &[AbiType::Size],
            ret: AbiType::Ptr,
        },
        RuntimeRoutine {
            name: REPORT_OOM,
            symbol: REPORT_OOM,
            params: &[AbiType::Size],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: REPORT_EXCEPTION,
            symbol: REPORT_EXCEPTION,
            params: &[AbiType::Ptr],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: REPORT_EXCEPTION_NAME,
            symbol: REPORT_EXCEPTION_NAME,
            params: &[AbiType::Ptr],
            ret: AbiType::Void,
        },
        RuntimeRoutine {
            name: REPORT_EXCEPTION_FRAME,
            symbol: REPORT_EXCEPTION_FRAME,
            params: &[AbiType::CInt, AbiType::Ptr, AbiType::Ptr, AbiType::CInt],
            ret: AbiType::Void,
        },
    ],
};

impl RuntimeModule {
    pub fn routine(&self, name: &str) -> Option<&RuntimeRoutine> {
        self.routines.iter().find(|r| r.name == name)
    }

    pub fn is_builtin(&self) -> bool {
        self.provider == RuntimeProvider::Builtin
    }

    /// Addresses of the routines implemented in this process, for
    /// registering with an in-memory linker. Empty for external modules.
    pub fn symbol_addresses(&self) -> Vec<(&'static str, *const u8)> {
        if !self.is_builtin() {
            return Vec::new();
        }
        use stubs::*;
        vec![
            ("freestand_signal_exception", freestand_signal_exception as *const u8),
            ("freestand_gc_pool_alloc", freestand_gc_pool_alloc as *const u8),
            ("freestand_report_oom", freestand_report_oom as *const u8),
            ("freestand_report_exception", freestand_report_exception as *const u8),
            (
                "freestand_report_exception_name",
                freestand_report_exception_name as *const u8,
            ),
            (
                "freestand_report_exception_frame",
                freestand_report_exception_frame as *const u8,
            ),
        ]
    }
}

impl fmt::Display for RuntimeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} runtime ({} routines)", self.name, self.routines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn test_minimal_and_managed_share_routine_names() {
        let minimal: Vec<_> = MINIMAL_RUNTIME.routines.iter().map(|r| r.name).collect();
        let managed: Vec<_> = MANAGED_RUNTIME.routines.iter().map(|r| r.name).collect();
        assert_eq!(minimal, managed);
        assert_eq!(minimal.len(), 6);
        assert!(MINIMAL_RUNTIME.is_builtin());
        assert!(!MANAGED_RUNTIME.is_builtin());
    }

    #[test]
    fn test_symbol_addresses_cover_every_builtin_routine() {
        let addresses = MINIMAL_RUNTIME.symbol_addresses();
        assert_eq!(addresses.len(), MINIMAL_RUNTIME.routines.len());
        for routine in MINIMAL_RUNTIME.routines {
            let (_, addr) = addresses
                .iter()
                .find(|(symbol, _)| *symbol == routine.symbol)
                .unwrap_or_else(|| panic!("no address for {}", routine.symbol));
            assert!(!addr.is_null());
        }
        assert!(MANAGED_RUNTIME.symbol_addresses().is_empty());
    }

    #[test]
    fn test_routine_signatures() {
        let alloc = MINIMAL_RUNTIME.routine(GC_POOL_ALLOC).unwrap();
        assert_eq!(alloc.params, &[AbiType::Size]);
        assert_eq!(alloc.ret, AbiType::Ptr);
        assert!(MINIMAL_RUNTIME.routine("gc_collect").is_none());
    }

    #[test]
    fn test_alloc_forwards_to_malloc() {
        let ptr = stubs::freestand_gc_pool_alloc(64);
        assert!(!ptr.is_null());
        unsafe {
            std::ptr::write_bytes(ptr as *mut u8, 0xAB, 64);
            assert_eq!(*(ptr as *const u8).add(63), 0xAB);
            libc::free(ptr);
        }
    }

    #[test]
    fn test_reporting_stubs_are_no_ops() {
        let name = CString::new("DivideError").unwrap();
        let file = CString::new("kernel.src").unwrap();
        stubs::freestand_signal_exception();
        stubs::freestand_report_oom(1 << 40);
        stubs::freestand_report_exception(name.as_ptr());
        stubs::freestand_report_exception_name(name.as_ptr());
        stubs::freestand_report_exception_frame(1, name.as_ptr(), file.as_ptr(), 42);
        stubs::freestand_report_exception(std::ptr::null());
    }
}
