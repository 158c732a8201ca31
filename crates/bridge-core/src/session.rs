//! Card session lifecycle.
//!
//! A [`CardSession`] is the owning handle for one logical connection to a
//! card over a [`TransportAdapter`]. Its state machine is `Open -> Closed`
//! with `Closed` terminal:
//!
//! - [`close`](CardSession::close) is idempotent; closing an already-closed
//!   session is a no-op, not an error.
//! - Dropping the session is the safety net for callers that never close
//!   explicitly. Deterministic, scoped closing is preferred; the drop path
//!   tolerates running after an explicit close without double-releasing.
//! - Every exchange attempted after close fails with
//!   [`Error::UseAfterClose`](crate::Error::UseAfterClose).
//!
//! # Concurrency
//!
//! A single card behind a single transport is a strictly sequential,
//! half-duplex resource. One mutex guards the exchange primitive, so one
//! APDU is in flight at a time and `close` waits for an in-flight exchange
//! to finish before releasing the transport. That mutex is *not* a
//! substitute for application-level serialization: multi-exchange
//! operations (verify-then-sign in particular) must be serialized by the
//! caller, or two callers can interleave VERIFY and the dependent command
//! and race each other into a PIN lockout.
//!
//! # Example
//!
//! ```
//! use idcard_bridge_core::session::CardSession;
//! use idcard_bridge_core::transport::TransportAdapter;
//!
//! let adapter = TransportAdapter::from_fn(|_cmd| Ok(vec![0x90, 0x00]));
//! let session = CardSession::new(adapter);
//! assert!(session.is_open());
//!
//! session.close();
//! session.close(); // no-op
//! assert!(!session.is_open());
//! ```

use std::sync::{Arc, Mutex, Weak};

use log::debug;

use crate::apdu::{Apdu, ApduResponse};
use crate::error::{Error, Result};
use crate::transport::TransportAdapter;

/// Shared session state.
///
/// The session owns this strongly; application handles opened on the
/// session hold it weakly, so they can neither outlive the transport nor
/// keep it alive.
pub(crate) struct SessionInner {
    /// The adapter, present while the session is open. `close` takes it
    /// out under the lock, which both releases the transport and waits for
    /// any in-flight exchange.
    adapter: Mutex<Option<TransportAdapter>>,
}

impl SessionInner {
    /// Sends one APDU over the session's transport.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterClose`] if the session is closed
    /// - transport and parse errors from [`TransportAdapter::transmit`]
    pub(crate) fn transmit(&self, apdu: &Apdu) -> Result<ApduResponse> {
        let mut guard = self
            .adapter
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        guard.as_mut().ok_or(Error::UseAfterClose)?.transmit(apdu)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.adapter
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    fn close(&self) {
        let released = self
            .adapter
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .is_some();

        if released {
            debug!("card session closed");
        }
    }
}

/// An open logical connection to a card.
///
/// Construction takes ownership of the [`TransportAdapter`]; the session
/// is the only strong owner of the transport from then on. Operations are
/// issued through application handles opened on the session (see
/// [`CryptoAp`](crate::crypto::CryptoAp)).
pub struct CardSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for CardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardSession")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl CardSession {
    /// Creates a session over the adapter.
    ///
    /// The safe core has nothing that can fail here; when the bridge is
    /// driven across the C boundary, transport installation failures are
    /// reported as [`Error::CardInit`](crate::Error::CardInit) before this
    /// constructor is reached.
    #[must_use]
    pub fn new(adapter: TransportAdapter) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                adapter: Mutex::new(Some(adapter)),
            }),
        }
    }

    /// Returns `true` until the session has been closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Closes the session, releasing the transport.
    ///
    /// Idempotent: the first call releases, every later call is a no-op.
    /// Waits for an in-flight exchange to complete before releasing, and
    /// is safe to call from a different thread than the one that created
    /// the session (e.g. a finalizer thread).
    pub fn close(&self) {
        self.inner.close();
    }

    /// Hands out a weak reference for application handles.
    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    /// Strong access for the duration of an `open` call.
    pub(crate) fn inner(&self) -> &SessionInner {
        &self.inner
    }
}

impl Drop for CardSession {
    fn drop(&mut self) {
        // Safety net for callers that never closed explicitly.
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    fn counting_session(counter: Arc<AtomicUsize>) -> CardSession {
        CardSession::new(TransportAdapter::from_fn(move |_cmd| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0x90, 0x00])
        }))
    }

    #[test]
    fn transmit_while_open() {
        let counter = Arc::new(AtomicUsize::new(0));
        let session = counting_session(counter.clone());

        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x0C, vec![]);
        let response = session.inner().transmit(&apdu).unwrap();

        assert!(response.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let session = counting_session(Arc::new(AtomicUsize::new(0)));

        assert!(session.is_open());
        session.close();
        session.close();
        assert!(!session.is_open());
    }

    #[test]
    fn transmit_after_close_fails() {
        let counter = Arc::new(AtomicUsize::new(0));
        let session = counting_session(counter.clone());
        session.close();

        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x0C, vec![]);
        let err = session.inner().transmit(&apdu).unwrap_err();

        assert!(matches!(err, Error::UseAfterClose));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn close_waits_for_in_flight_exchange() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // A transport that parks mid-exchange until released.
        let session = Arc::new(CardSession::new(TransportAdapter::from_fn(
            move |_cmd: &[u8]| {
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok(vec![0x90, 0x00])
            },
        )));

        let exchanging = Arc::clone(&session);
        let exchange = std::thread::spawn(move || {
            let apdu = Apdu::new(0x00, 0xB0, 0x00, 0x00, vec![]);
            exchanging.inner().transmit(&apdu)
        });
        entered_rx.recv().unwrap();

        let closing = Arc::clone(&session);
        let close = std::thread::spawn(move || closing.close());

        // The exchange still holds the lock, so close must not finish.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!close.is_finished());

        release_tx.send(()).unwrap();
        let response = exchange.join().unwrap().unwrap();
        assert!(response.is_success());

        close.join().unwrap();
        assert!(!session.is_open());
    }

    #[test]
    fn close_from_another_thread() {
        let session = Arc::new(counting_session(Arc::new(AtomicUsize::new(0))));

        let remote = Arc::clone(&session);
        std::thread::spawn(move || remote.close()).join().unwrap();

        assert!(!session.is_open());
    }
}
