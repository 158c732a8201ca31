//! Identity-Card Bridge: C ABI
//!
//! This crate exports the bridge core over a flat C ABI for host runtimes
//! that drive the card through finalizer-managed opaque handles (mobile
//! runtimes, .NET, JNI wrappers). Three handle types cross the boundary as
//! opaque pointers, each with a create/close/free protocol:
//!
//! - **transport**: created from a [`TransportCallback`], consumed by
//!   session creation.
//! - **session**: owns the transport; `close` is idempotent and `free` is
//!   the finalizer safety net that also closes.
//! - **crypto ap**: the PKI application handle opened on a session;
//!   operations fail with `UseAfterClose` once the session or the handle
//!   is closed.
//!
//! Byte payloads cross as [`ByteBuffer`] values and operation outcomes as
//! [`CallResult`] values; see the [`buffer`] and [`error`] module docs for
//! the exact ownership rules. All exported functions tolerate null handles
//! (returning an error or doing nothing) but not dangling ones.
//!
//! Handles are not internally synchronized across exported calls. One
//! operation per session at a time; `close`/`free` may race an in-flight
//! operation only for the session handle, which serializes internally.

pub mod buffer;
pub mod error;
pub mod transport;

use std::ffi::{c_char, CString};
use std::ptr;

use idcard_bridge_core::{CardSession, CryptoAp, Error, TransportAdapter};
use log::debug;

pub use crate::buffer::ByteBuffer;
pub use crate::error::{CallResult, ErrorCode};
pub use crate::transport::TransportCallback;

use crate::transport::CallbackTransport;

/// Writes `result` through `out` when `out` is non-null.
///
/// With a null `out` nobody receives the result, so its owned message and
/// buffer are released here instead of leaking.
unsafe fn write_result(out: *mut CallResult, result: CallResult) {
    if out.is_null() {
        idcard_string_free(result.message);
        idcard_buffer_free(result.buffer);
        return;
    }
    ptr::write(out, result);
}

/// Allocates a zeroed buffer of `len` bytes through Rust's allocator.
///
/// The caller owns the buffer and releases it with [`idcard_buffer_free`],
/// or hands it back across an API that documents an ownership transfer
/// (e.g. the transport callback's response).
#[no_mangle]
pub extern "C" fn idcard_buffer_alloc(len: usize) -> ByteBuffer {
    ByteBuffer::from_vec(vec![0u8; len])
}

/// Releases a buffer previously allocated by this library.
///
/// A null buffer is a no-op.
///
/// # Safety
///
/// `buffer` must be null or an unreleased descriptor originating from this
/// library; freeing it twice is undefined behavior.
#[no_mangle]
pub unsafe extern "C" fn idcard_buffer_free(buffer: ByteBuffer) {
    drop(buffer.into_vec());
}

/// Releases an error message from a [`CallResult`].
///
/// # Safety
///
/// `message` must be null or the unreleased `message` pointer of a
/// [`CallResult`] produced by this library.
#[no_mangle]
pub unsafe extern "C" fn idcard_string_free(message: *mut c_char) {
    if !message.is_null() {
        drop(CString::from_raw(message));
    }
}

/// Creates a transport handle from a callback.
///
/// Returns null if `callback` is null; the caller surfaces that as an
/// initialization failure. The handle is consumed by
/// [`idcard_session_new`] or released with [`idcard_transport_free`].
#[no_mangle]
pub extern "C" fn idcard_transport_new(
    callback: Option<TransportCallback>,
) -> *mut TransportAdapter {
    match callback {
        Some(callback) => Box::into_raw(Box::new(TransportAdapter::new(Box::new(
            CallbackTransport::new(callback),
        )))),
        None => ptr::null_mut(),
    }
}

/// Releases a transport handle that was never consumed by a session.
///
/// # Safety
///
/// `transport` must be null or a live handle from
/// [`idcard_transport_new`] that has not been passed to
/// [`idcard_session_new`].
#[no_mangle]
pub unsafe extern "C" fn idcard_transport_free(transport: *mut TransportAdapter) {
    if !transport.is_null() {
        drop(Box::from_raw(transport));
    }
}

/// Opens a session over a transport handle, consuming the handle.
///
/// On success returns the session handle and writes an `Ok` result through
/// `error`. A null transport yields a null session and a `CardInit` error;
/// nothing is consumed in that case.
///
/// # Safety
///
/// `transport` must be null or a live handle from
/// [`idcard_transport_new`]; after a successful call it is owned by the
/// session and must not be used or freed again. `error` must be null or
/// valid for one [`CallResult`] write.
#[no_mangle]
pub unsafe extern "C" fn idcard_session_new(
    transport: *mut TransportAdapter,
    error: *mut CallResult,
) -> *mut CardSession {
    if transport.is_null() {
        write_result(
            error,
            CallResult::err(&Error::CardInit(
                "transport handle is null".to_string(),
            )),
        );
        return ptr::null_mut();
    }

    let adapter = *Box::from_raw(transport);
    write_result(error, CallResult::ok_status());
    debug!("session handle created");
    Box::into_raw(Box::new(CardSession::new(adapter)))
}

/// Closes a session, releasing its transport. Idempotent; null is a no-op.
///
/// # Safety
///
/// `session` must be null or a live handle from [`idcard_session_new`].
#[no_mangle]
pub unsafe extern "C" fn idcard_session_close(session: *const CardSession) {
    if let Some(session) = session.as_ref() {
        session.close();
    }
}

/// Releases a session handle, closing it first if still open.
///
/// Intended as the finalizer call; null is a no-op.
///
/// # Safety
///
/// `session` must be null or a live handle from [`idcard_session_new`];
/// it must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn idcard_session_free(session: *mut CardSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Opens the card's PKI application on a session.
///
/// On success returns the application handle and writes an `Ok` result
/// through `error`; on failure returns null and writes the classified
/// error. A null session fails with `UseAfterClose`.
///
/// # Safety
///
/// `session` must be null or a live handle from [`idcard_session_new`].
/// `error` must be null or valid for one [`CallResult`] write.
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_open(
    session: *const CardSession,
    error: *mut CallResult,
) -> *mut CryptoAp {
    let Some(session) = session.as_ref() else {
        write_result(error, CallResult::err(&Error::UseAfterClose));
        return ptr::null_mut();
    };

    match CryptoAp::open(session) {
        Ok(ap) => {
            write_result(error, CallResult::ok_status());
            debug!("crypto ap handle opened");
            Box::into_raw(Box::new(ap))
        }
        Err(e) => {
            write_result(error, CallResult::err(&e));
            ptr::null_mut()
        }
    }
}

/// Reads the signing certificate (or its issuing CA certificate).
///
/// `pin` is borrowed for the duration of the call; the caller keeps
/// ownership and should scrub it afterwards. On success the returned
/// [`CallResult`] owns the DER certificate bytes.
///
/// # Safety
///
/// `ap` must be null or a live handle from [`idcard_crypto_ap_open`];
/// `pin` must satisfy the [`ByteBuffer`] borrow contract.
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_read_certificate_sign(
    ap: *const CryptoAp,
    pin: ByteBuffer,
    use_ca: bool,
) -> CallResult {
    let Some(ap) = ap.as_ref() else {
        return CallResult::err(&Error::UseAfterClose);
    };

    match ap.read_certificate_sign(pin.as_slice(), use_ca) {
        Ok(certificate) => CallResult::ok(certificate),
        Err(e) => CallResult::err(&e),
    }
}

/// Reads the authentication certificate (or its issuing CA certificate).
///
/// No PIN is required for this slot's certificates.
///
/// # Safety
///
/// `ap` must be null or a live handle from [`idcard_crypto_ap_open`].
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_read_certificate_auth(
    ap: *const CryptoAp,
    use_ca: bool,
) -> CallResult {
    let Some(ap) = ap.as_ref() else {
        return CallResult::err(&Error::UseAfterClose);
    };

    match ap.read_certificate_auth(use_ca) {
        Ok(certificate) => CallResult::ok(certificate),
        Err(e) => CallResult::err(&e),
    }
}

/// Signs a precomputed digest with the signing key.
///
/// `pin` and `digest` are borrowed for the duration of the call. On
/// success the returned [`CallResult`] owns the raw signature bytes.
///
/// # Safety
///
/// `ap` must be null or a live handle from [`idcard_crypto_ap_open`];
/// `pin` and `digest` must satisfy the [`ByteBuffer`] borrow contract.
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_sign(
    ap: *const CryptoAp,
    pin: ByteBuffer,
    digest: ByteBuffer,
) -> CallResult {
    let Some(ap) = ap.as_ref() else {
        return CallResult::err(&Error::UseAfterClose);
    };

    match ap.sign(pin.as_slice(), digest.as_slice()) {
        Ok(signature) => CallResult::ok(signature),
        Err(e) => CallResult::err(&e),
    }
}

/// Signs a precomputed digest with the authentication key.
///
/// # Safety
///
/// Same contract as [`idcard_crypto_ap_sign`].
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_auth(
    ap: *const CryptoAp,
    pin: ByteBuffer,
    digest: ByteBuffer,
) -> CallResult {
    let Some(ap) = ap.as_ref() else {
        return CallResult::err(&Error::UseAfterClose);
    };

    match ap.auth(pin.as_slice(), digest.as_slice()) {
        Ok(signature) => CallResult::ok(signature),
        Err(e) => CallResult::err(&e),
    }
}

/// Closes an application handle. Idempotent; null is a no-op.
///
/// Later operations on the handle fail with `UseAfterClose`. The session
/// stays open.
///
/// # Safety
///
/// `ap` must be null or a live handle from [`idcard_crypto_ap_open`].
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_close(ap: *const CryptoAp) {
    if let Some(ap) = ap.as_ref() {
        ap.close();
    }
}

/// Releases an application handle, closing it first if still open.
///
/// Intended as the finalizer call; null is a no-op.
///
/// # Safety
///
/// `ap` must be null or a live handle from [`idcard_crypto_ap_open`]; it
/// must not be used after this call.
#[no_mangle]
pub unsafe extern "C" fn idcard_crypto_ap_free(ap: *mut CryptoAp) {
    if !ap.is_null() {
        drop(Box::from_raw(ap));
    }
}
