//! C FFI bridge for the factory extraction tool.
//!
//! This module exposes challenge generation and CSR composition as
//! `extern "C"` symbols so the C++ tool that owns the binder connection to
//! the component can hand its bundle to the Rust core and get the finished
//! CSR back.
//!
//! # Safety
//!
//! All functions in this module use `unsafe` only at the FFI boundary to convert
//! between C pointers and Rust slices. The inner logic is entirely safe Rust.

use std::panic;
use std::ptr;

use tracing::error;

use crate::challenge::{self, SystemEntropy};
use crate::csr::{self, ComposeOptions};
use crate::provision;

/// Validate pointer and length for slice creation.
///
/// Ensures that:
/// 1. `ptr` is not null (unless `len` is 0).
/// 2. `ptr` is properly aligned for `T`.
/// 3. `len` * `size_of::<T>()` does not overflow `isize::MAX`.
///
/// Returns `None` if validation fails, or `Some(slice)` if successful.
unsafe fn validate_slice_args<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if len == 0 {
        return Some(&[]);
    }
    if ptr.is_null() {
        return None;
    }
    #[allow(clippy::manual_is_multiple_of)]
    if (ptr as usize) % std::mem::align_of::<T>() != 0 {
        return None;
    }
    let size_of_t = std::mem::size_of::<T>();
    if size_of_t > 0 {
        let size = len.checked_mul(size_of_t)?;
        if size > isize::MAX as usize {
            return None;
        }
    }
    Some(std::slice::from_raw_parts(ptr, len))
}

/// Result buffer returned to C/C++ callers.
/// The caller must free the buffer with `rust_free_buffer`.
#[repr(C)]
pub struct RustBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl RustBuffer {
    fn from_vec(v: Vec<u8>) -> Self {
        let mut boxed = v.into_boxed_slice();
        let data = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        RustBuffer { data, len }
    }

    fn empty() -> Self {
        RustBuffer {
            data: ptr::null_mut(),
            len: 0,
        }
    }
}

/// Free a buffer previously returned by a Rust FFI function.
///
/// # Safety
/// `buf.data` must have been allocated by Rust (returned from a `rust_*` function)
/// and must not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn rust_free_buffer(buf: RustBuffer) {
    if !buf.data.is_null() && buf.len > 0 {
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| unsafe {
            let _ = Box::from_raw(std::ptr::slice_from_raw_parts_mut(buf.data, buf.len));
        }));
    }
}

/// Generate a fresh challenge from the system entropy source.
///
/// Returns an empty buffer if entropy could not be read.
#[no_mangle]
pub extern "C" fn rust_generate_challenge() -> RustBuffer {
    panic::catch_unwind(panic::AssertUnwindSafe(|| {
        match challenge::generate_challenge(&mut SystemEntropy) {
            Ok(challenge) => RustBuffer::from_vec(challenge.into_vec()),
            Err(_) => RustBuffer::empty(),
        }
    }))
    .unwrap_or_else(|_| RustBuffer::empty())
}

/// Compose a CBOR certificate request from a component's bundle.
///
/// # Arguments
/// * `protected_data_ptr`/`protected_data_len` - CBOR ProtectedData from the component.
/// * `device_info_ptr`/`device_info_len` - CBOR DeviceInfo from the component.
/// * `challenge_ptr`/`challenge_len` - Challenge passed to the component.
/// * `mac_ptr`/`mac_len` - Keys-to-sign MAC returned by the component.
///
/// Returns an empty buffer if either blob is malformed. Trailing bytes after
/// a blob are rejected.
///
/// # Safety
/// All pointers must be valid for their stated lengths, or null if length is 0.
#[no_mangle]
pub unsafe extern "C" fn rust_compose_certificate_request(
    protected_data_ptr: *const u8,
    protected_data_len: usize,
    device_info_ptr: *const u8,
    device_info_len: usize,
    challenge_ptr: *const u8,
    challenge_len: usize,
    mac_ptr: *const u8,
    mac_len: usize,
) -> RustBuffer {
    panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let protected_data =
            match unsafe { validate_slice_args(protected_data_ptr, protected_data_len) } {
                Some(s) => s,
                None => return RustBuffer::empty(),
            };
        let device_info = match unsafe { validate_slice_args(device_info_ptr, device_info_len) } {
            Some(s) => s,
            None => return RustBuffer::empty(),
        };
        let challenge = match unsafe { validate_slice_args(challenge_ptr, challenge_len) } {
            Some(s) => s,
            None => return RustBuffer::empty(),
        };
        let mac = match unsafe { validate_slice_args(mac_ptr, mac_len) } {
            Some(s) => s,
            None => return RustBuffer::empty(),
        };

        match csr::compose_certificate_request(
            protected_data,
            device_info,
            challenge.to_vec(),
            mac.to_vec(),
            &ComposeOptions::default(),
        ) {
            Ok(csr) => RustBuffer::from_vec(csr.to_bytes()),
            Err(err) => {
                error!(%err, "certificate request composition failed");
                RustBuffer::empty()
            }
        }
    }))
    .unwrap_or_else(|_| RustBuffer::empty())
}

/// Base64-encode a serialized CSR. The result is ASCII without a NUL terminator.
///
/// # Safety
/// `data` must point to `len` valid bytes, or be null if `len` is 0.
#[no_mangle]
pub unsafe extern "C" fn rust_csr_to_base64(data: *const u8, len: usize) -> RustBuffer {
    panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let bytes = match unsafe { validate_slice_args(data, len) } {
            Some(b) => b,
            None => return RustBuffer::empty(),
        };
        match provision::to_base64(bytes) {
            Ok(text) => RustBuffer::from_vec(text.into_bytes()),
            Err(err) => {
                error!(%err, "base64 encoding failed");
                RustBuffer::empty()
            }
        }
    }))
    .unwrap_or_else(|_| RustBuffer::empty())
}
