//! # ferry-ffi - C-compatible FFI bindings
//!
//! Stable C ABI over the Ferry transfer controller. Foreign callers hold
//! opaque `u64` handles from the process-wide registry, start at most one
//! transfer per handle, and poll events as JSON strings.
//!
//! ## Safety
//!
//! String arguments must be null or point to NUL-terminated memory that
//! stays valid for the duration of the call. Null or non-UTF-8 strings are
//! rejected with `InvalidArgument`. Unknown handles are reported, never
//! dereferenced.
//!
//! ## Memory Management
//!
//! - Rust owns every controller; destroy it with `ferry_controller_destroy()`
//! - Strings returned as `*mut c_char` belong to the caller and must be freed
//!   with `ferry_free_string()`
//! - `ferry_version()` returns a static string that must NOT be freed
//!
//! ## Error Handling
//!
//! Operations return a [`FerryErrorCode`] as `c_int` (0 = success). The
//! message of the last failure on the calling thread is available from
//! `ferry_last_error()`. Panics are caught and reported as `InternalError`.

// FFI code inherently requires unsafe operations within unsafe functions
#![allow(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

pub mod controller;
pub mod error;

pub use controller::*;
pub use error::{FerryError, FerryErrorCode};

/// Initialize the Ferry FFI library
///
/// Installs the tracing subscriber (`RUST_LOG`, default `info`).
/// Returns 0 on success.
///
/// # Safety
///
/// Safe to call multiple times (idempotent).
#[unsafe(no_mangle)]
pub extern "C" fn ferry_init() -> c_int {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    FerryErrorCode::Success as c_int
}

/// Get the version string of the Ferry library
///
/// Returns a pointer to a static null-terminated string.
/// Caller must NOT free this pointer.
#[unsafe(no_mangle)]
pub extern "C" fn ferry_version() -> *const c_char {
    const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");
    VERSION.as_ptr() as *const c_char
}

/// Free a string returned by a Ferry FFI function
///
/// # Safety
///
/// - `s` must be null or a pointer returned by a Ferry FFI function
/// - `s` must not be used after this call
/// - `s` must not be freed multiple times
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferry_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Message of the last failed call on this thread
///
/// Returns null when no failure was recorded since the last call. The
/// caller frees the result with `ferry_free_string()`.
#[unsafe(no_mangle)]
pub extern "C" fn ferry_last_error() -> *mut c_char {
    match error::take_last_error() {
        Some(message) => to_c_string(message),
        None => std::ptr::null_mut(),
    }
}

/// Helper to convert Rust String to C string
pub(crate) fn to_c_string(s: String) -> *mut c_char {
    CString::new(s)
        .unwrap_or_else(|_| c"Invalid UTF-8".to_owned())
        .into_raw()
}

/// Helper to convert C string to Rust String
///
/// # Safety
///
/// - `s` must be null or a valid null-terminated string
pub(crate) unsafe fn from_c_string(s: *const c_char) -> Option<String> {
    if s.is_null() {
        None
    } else {
        CStr::from_ptr(s).to_str().ok().map(|s| s.to_string())
    }
}

/// Read a required string argument
///
/// # Safety
///
/// Same contract as [`from_c_string`].
pub(crate) unsafe fn string_arg(s: *const c_char, name: &str) -> Result<String, FerryError> {
    from_c_string(s)
        .ok_or_else(|| FerryError::invalid_argument(format!("{name} is null or not valid UTF-8")))
}

/// Run `f`, turning a panic into `fallback`
pub(crate) fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Panic caught at FFI boundary: {detail}");
            error::set_last_error(&FerryError::internal_error(format!("panic: {detail}")));
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        assert_eq!(ferry_init(), 0);
    }

    #[test]
    fn test_init_idempotent() {
        assert_eq!(ferry_init(), 0);
        assert_eq!(ferry_init(), 0);
    }

    #[test]
    fn test_version() {
        let version_ptr = ferry_version();
        assert!(!version_ptr.is_null());

        unsafe {
            let version_str = CStr::from_ptr(version_ptr).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
        assert_eq!(ferry_version(), ferry_version());
    }

    #[test]
    fn test_string_conversion() {
        let c_str = to_c_string("test string".to_string());

        unsafe {
            assert_eq!(from_c_string(c_str), Some("test string".to_string()));
            ferry_free_string(c_str);
        }
    }

    #[test]
    fn test_string_conversion_interior_nul() {
        let c_str = to_c_string("a\0b".to_string());
        unsafe {
            assert_eq!(from_c_string(c_str), Some("Invalid UTF-8".to_string()));
            ferry_free_string(c_str);
        }
    }

    #[test]
    fn test_from_c_string_null_and_invalid_utf8() {
        unsafe {
            assert_eq!(from_c_string(std::ptr::null()), None);

            let bytes = [0xffu8, 0xfe, 0x00];
            assert_eq!(from_c_string(bytes.as_ptr() as *const c_char), None);

            let err = string_arg(std::ptr::null(), "file_path").unwrap_err();
            assert_eq!(err.code, FerryErrorCode::InvalidArgument);
            assert!(err.message.contains("file_path"));
        }
    }

    #[test]
    fn test_free_null_string() {
        unsafe {
            ferry_free_string(std::ptr::null_mut());
        }
    }

    #[test]
    fn test_guarded_catches_panic() {
        let _ = error::take_last_error();
        let code = guarded(FerryErrorCode::InternalError as c_int, || panic!("boom"));
        assert_eq!(code, 99);

        let message = ferry_last_error();
        assert!(!message.is_null());
        unsafe {
            let text = CStr::from_ptr(message).to_str().unwrap();
            assert!(text.contains("boom"));
            ferry_free_string(message);
        }
        assert!(ferry_last_error().is_null());
    }
}
