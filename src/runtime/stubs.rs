//! Minimal runtime stubs callable from freestanding compiled code
//!
//! These extern "C" functions stand in for the managed runtime's support
//! routines. Apart from allocation they do nothing: freestanding code must
//! not rely on any of them delivering control anywhere.
//!
//! The calling convention is:
//! - Sizes are passed as `usize`
//! - Exception handles and names are opaque C string pointers
//! - Frame indices and line numbers are C ints

use std::ffi::{c_char, c_int, c_void};

// =========================================================================
// Exception Stubs
// =========================================================================

/// Raise an exception. No-op.
#[unsafe(no_mangle)]
pub extern "C" fn freestand_signal_exception() {}

/// Report an exception before it is raised. No-op.
#[unsafe(no_mangle)]
pub extern "C" fn freestand_report_exception(_ex: *const c_char) {}

/// Report the name of an exception. No-op.
#[unsafe(no_mangle)]
pub extern "C" fn freestand_report_exception_name(_ex: *const c_char) {}

/// Report one frame of an exception backtrace. No-op.
#[unsafe(no_mangle)]
pub extern "C" fn freestand_report_exception_frame(
    _idx: c_int,
    _func: *const c_char,
    _file: *const c_char,
    _line: c_int,
) {
}

// =========================================================================
// Allocation Stubs
// =========================================================================

/// Allocate `size` bytes with the platform allocator.
///
/// Returns whatever `malloc` returns, including null on failure.
#[unsafe(no_mangle)]
pub extern "C" fn freestand_gc_pool_alloc(size: usize) -> *mut c_void {
    unsafe { libc::malloc(size) }
}

/// Report an allocation failure. No-op.
#[unsafe(no_mangle)]
pub extern "C" fn freestand_report_oom(_size: usize) {}
