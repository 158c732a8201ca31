//! Identity-Card Bridge Core Library
//!
//! This crate drives the PKI application of a contact-less national
//! identity card (certificate retrieval and PIN-gated signing) over a
//! transport capability supplied by the embedding application. The card's
//! secure element performs all cryptography; this layer owns the protocol
//! and the resource lifecycle around it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Application Layer                    │
//! ├──────────────────────────────────────────────────────────┤
//! │                   Crypto AP (this crate)                 │
//! │  ┌──────────┐  ┌──────────┐  ┌─────────┐  ┌───────────┐  │
//! │  │ CertType │  │   APDU   │  │  Card   │  │ Transport │  │
//! │  │ KeySlot  │  │  Encode  │  │ Session │  │  Adapter  │  │
//! │  └──────────┘  └──────────┘  └─────────┘  └───────────┘  │
//! ├──────────────────────────────────────────────────────────┤
//! │        Injected transport (NFC stack, PC/SC, mock)       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use idcard_bridge_core::{CardSession, CryptoAp, TransportAdapter};
//!
//! # fn run() -> idcard_bridge_core::Result<()> {
//! // Inject whatever can exchange bytes with the card.
//! let adapter = TransportAdapter::from_fn(|_command| Ok(vec![0x90, 0x00]));
//! let session = CardSession::new(adapter);
//!
//! let ap = CryptoAp::open(&session)?;
//! let certificate = ap.read_certificate_auth(false)?;
//! let signature = ap.sign(b"1234", &[0u8; 32])?;
//! # let _ = (certificate, signature);
//!
//! session.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! One card behind one transport is a strictly sequential resource. The
//! session serializes individual APDU exchanges internally, but callers
//! must serialize whole operations per session; see the
//! [`session`] module docs for the PIN-lockout race this prevents.
//!
//! # Security Considerations
//!
//! - Private keys never leave the card
//! - PIN bytes are borrowed per call and scrubbed from every internal
//!   copy immediately after the VERIFY exchange
//! - PIN values never appear in errors or log output

pub mod apdu;
pub mod crypto;
pub mod der;
pub mod error;
pub mod session;
pub mod transport;

pub use apdu::{Apdu, ApduResponse};
pub use crypto::{CertType, CryptoAp, KeySlot};
pub use error::{Error, Result};
pub use session::CardSession;
pub use transport::{CardTransport, TransportAdapter};
