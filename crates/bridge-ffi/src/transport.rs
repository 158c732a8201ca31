//! Callback-based transport indirection.
//!
//! The embedding application registers a single `extern "C"` function that
//! moves one command to the card and one response back. Each APDU exchange
//! lends the command to the callback as a [`ByteBuffer`] and expects an
//! owned response buffer in return, with a null buffer signalling transport
//! failure.
//!
//! Ownership per exchange:
//!
//! - The command buffer stays owned by this side. The callback may read it
//!   only for the duration of the call; it is reclaimed and scrubbed as
//!   soon as the callback returns, since VERIFY commands carry PIN bytes.
//! - The response buffer is allocated by the foreign side (typically via
//!   `idcard_buffer_alloc`) and ownership transfers to this side, which
//!   releases it after parsing.

use idcard_bridge_core::transport::CardTransport;
use idcard_bridge_core::{Error, Result};
use zeroize::Zeroize;

use crate::buffer::ByteBuffer;

/// The transport function registered by the embedding application.
///
/// Receives one command APDU (borrowed for the duration of the call) and
/// returns the raw response bytes as an owned buffer, or the null buffer
/// on transport failure.
pub type TransportCallback = extern "C" fn(command: ByteBuffer) -> ByteBuffer;

/// Bridges a [`TransportCallback`] into the core [`CardTransport`] trait.
pub(crate) struct CallbackTransport {
    callback: TransportCallback,
}

impl CallbackTransport {
    pub(crate) fn new(callback: TransportCallback) -> Self {
        Self { callback }
    }
}

impl CardTransport for CallbackTransport {
    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let lent = ByteBuffer::from_vec(command.to_vec());
        let response = (self.callback)(lent);

        // Reclaim the lent command and scrub it; VERIFY carries PIN bytes.
        // Safe: `lent` came from `from_vec` above and the callback only
        // borrows it.
        let mut reclaimed = unsafe { lent.into_vec() };
        reclaimed.zeroize();

        if response.is_null() {
            return Err(Error::Transport(
                "transport callback reported failure".to_string(),
            ));
        }

        // Safe: a non-null response transfers ownership to us and must have
        // been allocated through `idcard_buffer_alloc`.
        Ok(unsafe { response.into_vec() })
    }
}
