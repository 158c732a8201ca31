//! C-compatible error reporting.
//!
//! Every fallible exported operation returns (or writes) a [`CallResult`]:
//! a stable numeric [`ErrorCode`], a code-specific `detail` word, and an
//! optional human-readable message. The message string is owned by the
//! caller and must be released with `idcard_string_free`.

use std::ffi::{c_char, CString};
use std::ptr;

use idcard_bridge_core::Error;

use crate::buffer::ByteBuffer;

/// Stable numeric error classification for foreign callers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The operation succeeded.
    Ok = 0,
    /// The injected transport failed to exchange bytes with the card.
    Transport = 1,
    /// The bridge could not be initialized (e.g. a null transport callback).
    CardInit = 2,
    /// The card rejected selection of the PKI application.
    ApplicationSelect = 3,
    /// Wrong PIN; `detail` carries the remaining attempts.
    PinVerification = 4,
    /// The PIN is locked and requires out-of-band unblocking.
    PinLocked = 5,
    /// The signature command failed; `detail` carries the status word.
    Signing = 6,
    /// The card lacks the expected file layout.
    IncompatibleCard = 7,
    /// Unclassified card status word; `detail` carries it.
    CardProtocol = 8,
    /// The handle was used after `close` or `free`.
    UseAfterClose = 9,
    /// The card's response could not be parsed.
    MalformedResponse = 10,
}

/// The outcome of one exported operation.
///
/// On success `code` is [`ErrorCode::Ok`] and `buffer` holds the result
/// bytes (ownership transfers to the caller; release with
/// `idcard_buffer_free`). On failure `buffer` is null, `code` classifies
/// the error, `detail` carries the code-specific word documented on
/// [`ErrorCode`], and `message` (when non-null) is a NUL-terminated
/// description to release with `idcard_string_free`.
#[repr(C)]
#[derive(Debug)]
pub struct CallResult {
    pub buffer: ByteBuffer,
    pub code: ErrorCode,
    pub detail: u16,
    pub message: *mut c_char,
}

impl CallResult {
    /// A successful result carrying `bytes`.
    pub(crate) fn ok(bytes: Vec<u8>) -> Self {
        Self {
            buffer: ByteBuffer::from_vec(bytes),
            code: ErrorCode::Ok,
            detail: 0,
            message: ptr::null_mut(),
        }
    }

    /// A successful result with no payload.
    pub(crate) const fn ok_status() -> Self {
        Self {
            buffer: ByteBuffer::empty(),
            code: ErrorCode::Ok,
            detail: 0,
            message: ptr::null_mut(),
        }
    }

    /// A failed result classified from a core error.
    pub(crate) fn err(error: &Error) -> Self {
        let (code, detail) = classify(error);

        // The display string never contains PIN material, so it is safe to
        // hand across the boundary. Interior NULs cannot occur; fall back
        // to a null message rather than failing the error path.
        let message = CString::new(error.to_string())
            .map(CString::into_raw)
            .unwrap_or(ptr::null_mut());

        Self {
            buffer: ByteBuffer::empty(),
            code,
            detail,
            message,
        }
    }
}

fn classify(error: &Error) -> (ErrorCode, u16) {
    match error {
        Error::Transport(_) => (ErrorCode::Transport, 0),
        Error::CardInit(_) => (ErrorCode::CardInit, 0),
        Error::UseAfterClose => (ErrorCode::UseAfterClose, 0),
        Error::ApplicationSelect(sw) => (ErrorCode::ApplicationSelect, *sw),
        Error::PinVerification { remaining } => {
            (ErrorCode::PinVerification, u16::from(*remaining))
        }
        Error::PinLocked => (ErrorCode::PinLocked, 0),
        Error::Signing(sw) => (ErrorCode::Signing, *sw),
        Error::IncompatibleCard => (ErrorCode::IncompatibleCard, 0),
        Error::CardProtocol(sw) => (ErrorCode::CardProtocol, *sw),
        Error::MalformedResponse(_) => (ErrorCode::MalformedResponse, 0),
        _ => (ErrorCode::CardProtocol, 0),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    #[test]
    fn wrong_pin_carries_remaining_attempts() {
        let result = CallResult::err(&Error::PinVerification { remaining: 2 });

        assert_eq!(result.code, ErrorCode::PinVerification);
        assert_eq!(result.detail, 2);
        assert!(result.buffer.is_null());

        let message = unsafe { CStr::from_ptr(result.message) };
        assert!(message.to_str().unwrap().contains('2'));
        drop(unsafe { CString::from_raw(result.message) });
    }

    #[test]
    fn protocol_errors_carry_the_status_word() {
        let result = CallResult::err(&Error::CardProtocol(0x6D00));

        assert_eq!(result.code, ErrorCode::CardProtocol);
        assert_eq!(result.detail, 0x6D00);
        drop(unsafe { CString::from_raw(result.message) });
    }

    #[test]
    fn success_owns_its_payload() {
        let result = CallResult::ok(vec![0x30, 0x82]);

        assert_eq!(result.code, ErrorCode::Ok);
        assert!(result.message.is_null());
        assert_eq!(unsafe { result.buffer.into_vec() }, vec![0x30, 0x82]);
    }
}
