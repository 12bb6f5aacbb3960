//! Error handling for the FFI boundary

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use ferry_core::ControllerError;

/// FFI return codes
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FerryErrorCode {
    /// Operation succeeded
    Success = 0,
    /// Null, non-UTF-8 or otherwise unusable argument
    InvalidArgument = 1,
    /// No controller with that handle
    UnknownHandle = 2,
    /// Controller already runs a session
    Busy = 3,
    /// Ticket or target failed to decode
    InvalidTicket = 4,
    /// Internal error, including caught panics
    InternalError = 99,
}

impl From<i32> for FerryErrorCode {
    fn from(code: i32) -> Self {
        match code {
            0 => FerryErrorCode::Success,
            1 => FerryErrorCode::InvalidArgument,
            2 => FerryErrorCode::UnknownHandle,
            3 => FerryErrorCode::Busy,
            4 => FerryErrorCode::InvalidTicket,
            _ => FerryErrorCode::InternalError,
        }
    }
}

/// Error type for FFI operations
#[derive(Debug)]
pub struct FerryError {
    /// Code returned to the caller
    pub code: FerryErrorCode,
    /// Human readable detail, kept for `ferry_last_error`
    pub message: String,
}

impl FerryError {
    /// Create an error
    pub fn new(code: FerryErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Unusable argument
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FerryErrorCode::InvalidArgument, message)
    }

    /// Stale or never issued handle
    pub fn unknown_handle(handle: u64) -> Self {
        Self::new(
            FerryErrorCode::UnknownHandle,
            format!("Unknown controller handle {handle}"),
        )
    }

    /// Internal failure
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(FerryErrorCode::InternalError, message)
    }

    /// Convert error to C-compatible error string
    pub fn to_c_string(&self) -> *mut c_char {
        CString::new(self.message.clone())
            .unwrap_or_else(|_| c"Invalid error message".to_owned())
            .into_raw()
    }
}

impl From<ControllerError> for FerryError {
    fn from(err: ControllerError) -> Self {
        let code = match &err {
            ControllerError::Busy => FerryErrorCode::Busy,
            ControllerError::InvalidTicket(_) => FerryErrorCode::InvalidTicket,
            ControllerError::UnknownHandle(_) => FerryErrorCode::UnknownHandle,
            ControllerError::InvalidArgument(_) | ControllerError::InvalidConfig(_) => {
                FerryErrorCode::InvalidArgument
            }
            ControllerError::Runtime(_) => FerryErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Remember the message of the most recent failure on this thread
pub(crate) fn set_last_error(err: &FerryError) {
    tracing::debug!("FFI call failed ({:?}): {}", err.code, err.message);
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.message.clone()));
}

/// Take the most recent failure message of this thread
pub(crate) fn take_last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Unwrap a `Result` inside a function returning a `c_int` code
///
/// On error the message is recorded for `ferry_last_error` and the code is
/// returned.
#[macro_export]
macro_rules! ffi_try {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                let ferry_err: $crate::error::FerryError = err.into();
                $crate::error::set_last_error(&ferry_err);
                return ferry_err.code as std::os::raw::c_int;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::TicketError;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(FerryErrorCode::from(0), FerryErrorCode::Success);
        assert_eq!(FerryErrorCode::from(1), FerryErrorCode::InvalidArgument);
        assert_eq!(FerryErrorCode::from(2), FerryErrorCode::UnknownHandle);
        assert_eq!(FerryErrorCode::from(3), FerryErrorCode::Busy);
        assert_eq!(FerryErrorCode::from(4), FerryErrorCode::InvalidTicket);
        assert_eq!(FerryErrorCode::from(99), FerryErrorCode::InternalError);
        assert_eq!(FerryErrorCode::from(-7), FerryErrorCode::InternalError);
    }

    #[test]
    fn test_error_code_values() {
        assert_eq!(FerryErrorCode::Success as i32, 0);
        assert_eq!(FerryErrorCode::InvalidArgument as i32, 1);
        assert_eq!(FerryErrorCode::UnknownHandle as i32, 2);
        assert_eq!(FerryErrorCode::Busy as i32, 3);
        assert_eq!(FerryErrorCode::InvalidTicket as i32, 4);
        assert_eq!(FerryErrorCode::InternalError as i32, 99);
    }

    #[test]
    fn test_from_controller_error() {
        let busy: FerryError = ControllerError::Busy.into();
        assert_eq!(busy.code, FerryErrorCode::Busy);

        let ticket: FerryError = ControllerError::InvalidTicket(TicketError::MissingPrefix).into();
        assert_eq!(ticket.code, FerryErrorCode::InvalidTicket);

        let unknown: FerryError = ControllerError::UnknownHandle(9).into();
        assert_eq!(unknown.code, FerryErrorCode::UnknownHandle);

        let config: FerryError = ControllerError::InvalidConfig("chunk_size".into()).into();
        assert_eq!(config.code, FerryErrorCode::InvalidArgument);
    }

    #[test]
    fn test_error_to_c_string() {
        let err = FerryError::internal_error("test error");
        let c_str = err.to_c_string();
        assert!(!c_str.is_null());

        unsafe {
            let message = std::ffi::CStr::from_ptr(c_str).to_str().unwrap();
            assert_eq!(message, "test error");
            crate::ferry_free_string(c_str);
        }
    }

    #[test]
    fn test_error_with_interior_nul() {
        let err = FerryError::internal_error("bad\0message");
        let c_str = err.to_c_string();
        unsafe {
            let message = std::ffi::CStr::from_ptr(c_str).to_str().unwrap();
            assert_eq!(message, "Invalid error message");
            crate::ferry_free_string(c_str);
        }
    }

    #[test]
    fn test_ffi_try_macro() {
        fn succeed() -> std::os::raw::c_int {
            let result: Result<i32, FerryError> = Ok(42);
            let value = ffi_try!(result);
            assert_eq!(value, 42);
            0
        }

        fn fail() -> std::os::raw::c_int {
            let result: Result<(), ControllerError> = Err(ControllerError::Busy);
            ffi_try!(result);
            0
        }

        let _ = take_last_error();
        assert_eq!(succeed(), 0);
        assert!(take_last_error().is_none());

        assert_eq!(fail(), FerryErrorCode::Busy as i32);
        let message = take_last_error().unwrap();
        assert!(message.contains("busy"));
        assert!(take_last_error().is_none());
    }
}
