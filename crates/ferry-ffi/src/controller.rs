//! Controller FFI functions

use std::os::raw::{c_char, c_int};
use std::ptr;

use ferry_core::{ControllerConfig, PollResult, Registry, Settings};

use crate::error::{FerryError, FerryErrorCode, set_last_error};
use crate::{ffi_try, guarded, string_arg, to_c_string};

const SUCCESS: c_int = FerryErrorCode::Success as c_int;
const INTERNAL: c_int = FerryErrorCode::InternalError as c_int;

fn create(config: Result<ControllerConfig, FerryError>) -> u64 {
    match config.and_then(|config| Registry::global().create(config).map_err(FerryError::from)) {
        Ok(handle) => handle,
        Err(err) => {
            set_last_error(&err);
            0
        }
    }
}

/// Create a controller with default settings
///
/// Returns the new handle, or 0 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn ferry_controller_create() -> u64 {
    guarded(0, || create(Ok(ControllerConfig::default())))
}

/// Create a controller from a JSON settings document
///
/// Missing keys take their defaults. Returns the new handle, or 0 when the
/// JSON is null, malformed, or describes an invalid configuration.
///
/// # Safety
///
/// - `json` must be null or a valid null-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferry_controller_create_with_config(json: *const c_char) -> u64 {
    guarded(0, || {
        let config = string_arg(json, "json").and_then(|json| {
            Settings::from_json(&json)
                .and_then(Settings::into_config)
                .map_err(|e| FerryError::invalid_argument(e.to_string()))
        });
        create(config)
    })
}

/// Start sending `file_path` and publish a ticket for the receiver
///
/// # Safety
///
/// - `file_path` must be null or a valid null-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferry_controller_start_send_wait(
    handle: u64,
    file_path: *const c_char,
) -> c_int {
    guarded(INTERNAL, || {
        let file_path = ffi_try!(string_arg(file_path, "file_path"));
        ffi_try!(Registry::global().start_send_wait(handle, file_path));
        SUCCESS
    })
}

/// Send `file_path` to the receiver that published `ticket`
///
/// # Safety
///
/// - `file_path` and `ticket` must be null or valid null-terminated strings
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferry_controller_start_send_to_ticket(
    handle: u64,
    file_path: *const c_char,
    ticket: *const c_char,
) -> c_int {
    guarded(INTERNAL, || {
        let file_path = ffi_try!(string_arg(file_path, "file_path"));
        let ticket = ffi_try!(string_arg(ticket, "ticket"));
        ffi_try!(Registry::global().start_send_to_ticket(handle, file_path, &ticket));
        SUCCESS
    })
}

/// Receive into `output_dir` from the sender named by `target`
///
/// `target` is a ticket or a direct `host:port` address.
///
/// # Safety
///
/// - `target` and `output_dir` must be null or valid null-terminated strings
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferry_controller_start_receive_target(
    handle: u64,
    target: *const c_char,
    output_dir: *const c_char,
) -> c_int {
    guarded(INTERNAL, || {
        let target = ffi_try!(string_arg(target, "target"));
        let output_dir = ffi_try!(string_arg(output_dir, "output_dir"));
        ffi_try!(Registry::global().start_receive_by_target(handle, &target, output_dir));
        SUCCESS
    })
}

/// Listen for a sender and receive into `output_dir`
///
/// # Safety
///
/// - `output_dir` must be null or a valid null-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ferry_controller_start_receive_listen(
    handle: u64,
    output_dir: *const c_char,
) -> c_int {
    guarded(INTERNAL, || {
        let output_dir = ffi_try!(string_arg(output_dir, "output_dir"));
        ffi_try!(Registry::global().start_receive_listen(handle, output_dir));
        SUCCESS
    })
}

/// Take the next event as a JSON object
///
/// Returns null when nothing is pending or the handle is unknown. The caller
/// frees the result with `ferry_free_string()`.
#[unsafe(no_mangle)]
pub extern "C" fn ferry_controller_poll_event_json(handle: u64) -> *mut c_char {
    guarded(ptr::null_mut(), || match Registry::global().poll(handle) {
        PollResult::Event(event) => match event.to_json() {
            Ok(json) => to_c_string(json),
            Err(e) => {
                set_last_error(&FerryError::internal_error(format!(
                    "event serialization failed: {e}"
                )));
                ptr::null_mut()
            }
        },
        PollResult::Empty => ptr::null_mut(),
        PollResult::UnknownHandle => {
            set_last_error(&FerryError::unknown_handle(handle));
            ptr::null_mut()
        }
    })
}

/// Whether `handle` names a live controller
#[unsafe(no_mangle)]
pub extern "C" fn ferry_controller_is_alive(handle: u64) -> bool {
    guarded(false, || Registry::global().contains(handle))
}

/// Cancel the controller's session, if any
///
/// The session ends with a single `cancelled` event.
#[unsafe(no_mangle)]
pub extern "C" fn ferry_controller_cancel(handle: u64) -> c_int {
    guarded(INTERNAL, || {
        ffi_try!(Registry::global().cancel(handle));
        SUCCESS
    })
}

/// Cancel and release a controller; the handle is invalid afterwards
#[unsafe(no_mangle)]
pub extern "C" fn ferry_controller_destroy(handle: u64) -> c_int {
    guarded(INTERNAL, || {
        ffi_try!(Registry::global().destroy(handle));
        SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ferry_free_string;
    use std::ffi::{CStr, CString};
    use std::time::{Duration, Instant};

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    fn loopback_controller() -> u64 {
        let json = c(r#"{"bind_addr": "127.0.0.1:0"}"#);
        let handle = unsafe { ferry_controller_create_with_config(json.as_ptr()) };
        assert_ne!(handle, 0);
        handle
    }

    fn poll_json(handle: u64, timeout: Duration) -> Option<serde_json::Value> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let ptr = ferry_controller_poll_event_json(handle);
            if !ptr.is_null() {
                let value = unsafe {
                    let text = CStr::from_ptr(ptr).to_str().unwrap().to_string();
                    ferry_free_string(ptr);
                    text
                };
                return Some(serde_json::from_str(&value).unwrap());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_create_and_destroy() {
        let handle = ferry_controller_create();
        assert_ne!(handle, 0);
        assert!(ferry_controller_is_alive(handle));
        assert!(ferry_controller_poll_event_json(handle).is_null());

        assert_eq!(ferry_controller_destroy(handle), 0);
        assert!(!ferry_controller_is_alive(handle));
        assert_eq!(
            ferry_controller_destroy(handle),
            FerryErrorCode::UnknownHandle as c_int
        );
    }

    #[test]
    fn test_create_with_bad_config() {
        unsafe {
            assert_eq!(ferry_controller_create_with_config(ptr::null()), 0);

            let garbage = c("{not json");
            assert_eq!(ferry_controller_create_with_config(garbage.as_ptr()), 0);

            let zero_chunk = c(r#"{"chunk_size": 0}"#);
            assert_eq!(ferry_controller_create_with_config(zero_chunk.as_ptr()), 0);
        }
    }

    #[test]
    fn test_unknown_handle_is_harmless() {
        assert!(!ferry_controller_is_alive(0));
        assert!(ferry_controller_poll_event_json(u64::MAX).is_null());
        assert_eq!(
            ferry_controller_cancel(u64::MAX),
            FerryErrorCode::UnknownHandle as c_int
        );

        let dir = c("/tmp");
        let code = unsafe { ferry_controller_start_receive_listen(u64::MAX, dir.as_ptr()) };
        assert_eq!(code, FerryErrorCode::UnknownHandle as c_int);
    }

    #[test]
    fn test_null_arguments() {
        let handle = loopback_controller();
        unsafe {
            assert_eq!(
                ferry_controller_start_send_wait(handle, ptr::null()),
                FerryErrorCode::InvalidArgument as c_int
            );
            let path = c("/tmp/file");
            assert_eq!(
                ferry_controller_start_send_to_ticket(handle, path.as_ptr(), ptr::null()),
                FerryErrorCode::InvalidArgument as c_int
            );
            assert_eq!(
                ferry_controller_start_receive_target(handle, ptr::null(), path.as_ptr()),
                FerryErrorCode::InvalidArgument as c_int
            );
        }
        assert!(ferry_controller_poll_event_json(handle).is_null());
        ferry_controller_destroy(handle);
    }

    #[test]
    fn test_invalid_ticket_creates_no_session() {
        let handle = loopback_controller();
        let path = c("/tmp/file");
        let ticket = c("ferry:not-a-ticket!");
        let code = unsafe {
            ferry_controller_start_send_to_ticket(handle, path.as_ptr(), ticket.as_ptr())
        };
        assert_eq!(code, FerryErrorCode::InvalidTicket as c_int);

        let message = crate::ferry_last_error();
        assert!(!message.is_null());
        unsafe { ferry_free_string(message) };

        std::thread::sleep(Duration::from_millis(50));
        assert!(ferry_controller_poll_event_json(handle).is_null());
        ferry_controller_destroy(handle);
    }

    #[test]
    fn test_listen_then_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let handle = loopback_controller();
        let out = c(dir.path().to_str().unwrap());

        assert_eq!(
            unsafe { ferry_controller_start_receive_listen(handle, out.as_ptr()) },
            0
        );
        assert_eq!(
            unsafe { ferry_controller_start_receive_listen(handle, out.as_ptr()) },
            FerryErrorCode::Busy as c_int
        );

        let ready = poll_json(handle, Duration::from_secs(5)).unwrap();
        assert_eq!(ready["kind"], "ticket_ready");
        assert!(ready["ticket"].as_str().unwrap().starts_with("ferry:"));
        assert!(ready["timestamp_ms"].as_u64().is_some());

        assert_eq!(ferry_controller_cancel(handle), 0);
        let done = poll_json(handle, Duration::from_secs(10)).unwrap();
        assert_eq!(done["kind"], "cancelled");
        assert!(poll_json(handle, Duration::from_millis(100)).is_none());

        assert_eq!(ferry_controller_destroy(handle), 0);
    }
}
