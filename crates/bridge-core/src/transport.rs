//! Transport abstraction between the card protocol and the outside world.
//!
//! The bridge never talks to card hardware itself. An externally supplied
//! capability (anything that can take a command byte sequence and return a
//! response byte sequence) is injected behind the [`CardTransport`] trait,
//! and [`TransportAdapter`] frames APDUs over it.
//!
//! # Contract
//!
//! - `exchange` is synchronous from the bridge's perspective, regardless of
//!   how the transport itself is implemented.
//! - A failing transport surfaces [`Error::Transport`] as-is; this layer
//!   never retries. Retry policy belongs to the caller of the high-level
//!   operations.
//! - One exchange may be in flight per adapter at a time. `&mut self`
//!   enforces this statically; the transport is never re-entered while a
//!   call is executing.
//!
//! # Example
//!
//! ```
//! use idcard_bridge_core::transport::TransportAdapter;
//!
//! // A loopback transport that answers every command with SW 0x9000.
//! let adapter = TransportAdapter::from_fn(|_command| Ok(vec![0x90, 0x00]));
//! # let _ = adapter;
//! ```

use log::debug;
use zeroize::Zeroizing;

use crate::apdu::{Apdu, ApduResponse};
use crate::error::{Error, Result};

/// A byte-in/byte-out exchange capability supplied by the embedding
/// application.
///
/// Implementations hold no card semantics: they move one command to the
/// card and one response back, fallibly. Timeouts and disconnects are
/// reported as errors and become [`Error::Transport`].
pub trait CardTransport: Send {
    /// Sends one command APDU and returns the raw response bytes,
    /// including the trailing status word.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport is disconnected, timed
    /// out, or failed in any other way.
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>>;
}

impl<F> CardTransport for F
where
    F: FnMut(&[u8]) -> Result<Vec<u8>> + Send,
{
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        self(command)
    }
}

/// Adapts an injected [`CardTransport`] capability into an APDU-level
/// exchange primitive.
///
/// The adapter owns the capability for the lifetime of the session it is
/// handed to, serializes commands, validates that responses carry at least
/// a status word, and parses them into [`ApduResponse`]s.
pub struct TransportAdapter {
    inner: Box<dyn CardTransport>,
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter").finish_non_exhaustive()
    }
}

impl TransportAdapter {
    /// Wraps a boxed transport capability.
    #[must_use]
    pub fn new(inner: Box<dyn CardTransport>) -> Self {
        Self { inner }
    }

    /// Wraps a closure as the transport capability.
    ///
    /// # Example
    ///
    /// ```
    /// use idcard_bridge_core::transport::TransportAdapter;
    ///
    /// let adapter = TransportAdapter::from_fn(|_cmd| Ok(vec![0x90, 0x00]));
    /// # let _ = adapter;
    /// ```
    #[must_use]
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(&[u8]) -> Result<Vec<u8>> + Send + 'static,
    {
        Self::new(Box::new(f))
    }

    /// Sends one APDU and parses the response.
    ///
    /// The serialized command is scrubbed after the exchange; commands may
    /// carry PIN bytes. Logged fields are limited to the header bytes and
    /// lengths.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the capability fails
    /// - [`Error::MalformedResponse`] if the response is shorter than a
    ///   status word
    pub(crate) fn transmit(&mut self, apdu: &Apdu) -> Result<ApduResponse> {
        let command = Zeroizing::new(apdu.to_bytes());
        debug!(
            "apdu out: cla={:02x} ins={:02x} p1={:02x} p2={:02x} lc={} le={}",
            apdu.cla(),
            apdu.ins(),
            apdu.p1(),
            apdu.p2(),
            apdu.data().len(),
            apdu.le(),
        );

        let raw = self.inner.exchange(&command)?;
        if raw.len() < 2 {
            return Err(Error::MalformedResponse(
                "response shorter than a status word".to_string(),
            ));
        }

        let response = ApduResponse::new(raw);
        debug!(
            "apdu in: sw={:04x} len={}",
            response.status_word(),
            response.data().len(),
        );

        Ok(response)
    }
}
