//! Error types for the identity-card bridge.
//!
//! This module provides a single error type [`enum@Error`] covering every
//! failure mode of the bridge: transport faults, session lifecycle misuse,
//! application selection, and the card's own status-word rejections.
//!
//! # Error Categories
//!
//! - **Transport errors**: the externally supplied transport failed or
//!   disconnected; surfaced as-is, never retried by this layer
//! - **Lifecycle errors**: a session or application handle was used after
//!   it was closed
//! - **Card errors**: the card rejected a command; PIN failures carry the
//!   remaining attempt count, everything else carries the raw status word
//!
//! PIN values never appear in any error payload.
//!
//! # Example
//!
//! ```
//! use idcard_bridge_core::Error;
//!
//! let err = Error::PinVerification { remaining: 2 };
//! assert!(matches!(err, Error::PinVerification { remaining: 2 }));
//! ```

use core::result::Result as CoreResult;

use thiserror::Error;

/// The main error type for the identity-card bridge.
///
/// This enum encompasses all possible errors that can occur while driving
/// the card over an external transport: establishing the session, selecting
/// the PKI application, verifying PINs, and executing signing or read
/// operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The underlying transport failed (disconnected, timed out, or raised
    /// any error of its own). Retry policy belongs to the caller.
    #[error("transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The card session could not be established.
    #[error("failed to initialize card session: {0}")]
    CardInit(String),

    /// A session or application handle was used after it was closed.
    #[error("handle used after close")]
    UseAfterClose,

    // =========================================================================
    // Card Protocol Errors
    // =========================================================================
    /// The PKI application is absent or could not be selected.
    #[error("PKI application could not be selected: SW={0:#06x}")]
    ApplicationSelect(u16),

    /// The PIN was wrong; the card reports how many attempts remain.
    #[error("PIN verification failed, {remaining} attempt(s) remaining")]
    PinVerification {
        /// Attempts left before the PIN locks.
        remaining: u8,
    },

    /// The PIN is locked after too many failed attempts. Terminal for the
    /// key slot until an external unlock.
    #[error("PIN is locked after too many failed attempts")]
    PinLocked,

    /// The card rejected a signature computation (e.g. malformed digest
    /// length).
    #[error("signature computation rejected by card: SW={0:#06x}")]
    Signing(u16),

    /// The card reported a referenced file or key as not found, which
    /// implies a malformed or incompatible card rather than a runtime
    /// fault.
    #[error("referenced file or key not found on card; card is likely incompatible")]
    IncompatibleCard,

    /// The card returned a status word this bridge does not classify.
    #[error("unexpected status word: SW={0:#06x}")]
    CardProtocol(u16),

    /// The response from the transport was structurally invalid.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A specialized [`Result`] type for bridge operations.
pub type Result<T> = CoreResult<T, Error>;
