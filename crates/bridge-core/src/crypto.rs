//! The on-card PKI application ("Crypto AP").
//!
//! [`CryptoAp`] is opened from an open [`CardSession`] and exposes the
//! card's certificate files and its two PIN-gated private key slots:
//!
//! | Slot | Key file | PIN file | Purpose                       |
//! |------|----------|----------|-------------------------------|
//! | sign | `001A`   | `001B`   | Document signatures           |
//! | auth | `0017`   | `0018`   | Session authentication        |
//!
//! Certificates live in their own files (`0001`/`0002` for the signing
//! pair, `000A`/`000B` for the authentication pair) and are retrieved with
//! chunked READ BINARY commands bounded by the DER-declared length. The
//! signing certificate is the only one behind a PIN; the authentication
//! certificate is publicly readable even though its private key is not.
//!
//! # Lifecycle
//!
//! The application handle holds a weak reference to the session: it must
//! not outlive the session, and closing it does not close the session.
//! [`close`](CryptoAp::close) is explicit and idempotent, with a `Drop`
//! safety net; any operation after either handle is gone fails with
//! [`Error::UseAfterClose`].
//!
//! # PIN semantics
//!
//! A wrong PIN surfaces [`Error::PinVerification`] with the card's
//! remaining-attempt counter. Once the card reports the slot locked, the
//! handle latches that state and every later PIN-gated operation on the
//! slot fails with [`Error::PinLocked`] without sending another VERIFY.
//! PIN bytes are borrowed for the duration of a call; every internal copy
//! is scrubbed right after the VERIFY exchange, whether it succeeded or
//! not, and never appears in errors or logs.
//!
//! # Example
//!
//! ```
//! use idcard_bridge_core::crypto::CryptoAp;
//! use idcard_bridge_core::session::CardSession;
//! use idcard_bridge_core::transport::TransportAdapter;
//!
//! # fn run() -> idcard_bridge_core::Result<()> {
//! let adapter = TransportAdapter::from_fn(|_cmd| Ok(vec![0x90, 0x00]));
//! let session = CardSession::new(adapter);
//!
//! let ap = CryptoAp::open(&session)?;
//! let signature = ap.sign(b"1234", &[0u8; 32])?;
//! # let _ = signature;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::debug;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::apdu::Apdu;
use crate::der;
use crate::error::{Error, Result};
use crate::session::{CardSession, SessionInner};

/// Identifier of the PKI application on the card.
const AP_ID: [u8; 10] = [0xD3, 0x92, 0xF0, 0x00, 0x26, 0x01, 0x00, 0x00, 0x00, 0x01];

/// Instruction codes used by the application.
mod ins {
    /// `SELECT FILE`.
    pub(super) const SELECT: u8 = 0xA4;

    /// `VERIFY` (PIN).
    pub(super) const VERIFY: u8 = 0x20;

    /// `READ BINARY`.
    pub(super) const READ_BINARY: u8 = 0xB0;

    /// `COMPUTE DIGITAL SIGNATURE` (proprietary class).
    pub(super) const COMPUTE_SIGNATURE: u8 = 0x2A;
}

/// SELECT parameter bytes.
const SELECT_P1_DF: u8 = 0x04;
const SELECT_P1_EF: u8 = 0x02;
const SELECT_P2: u8 = 0x0C;

/// VERIFY references the PIN of the currently selected file.
const VERIFY_P2: u8 = 0x80;

/// COMPUTE DIGITAL SIGNATURE parameters.
const SIGN_CLA: u8 = 0x80;
const SIGN_P1: u8 = 0x00;
const SIGN_P2: u8 = 0x80;

/// Number of bytes fetched to decode the DER header of a certificate
/// file. Enough for a two-octet tag and a length of up to four octets.
const DER_PROBE_LEN: u16 = 7;

/// Type of certificate to fetch from the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertType {
    /// Certificate for session authentication.
    #[serde(rename = "auth")]
    Auth,

    /// Certificate of the CA that issued the authentication certificate.
    #[serde(rename = "auth-ca")]
    AuthCa,

    /// Certificate for signing documents.
    #[serde(rename = "sign")]
    Sign,

    /// Certificate of the CA that issued the signing certificate.
    #[serde(rename = "sign-ca")]
    SignCa,
}

impl CertType {
    /// Returns the identifier of the file holding this certificate.
    ///
    /// # Example
    ///
    /// ```
    /// use idcard_bridge_core::crypto::CertType;
    ///
    /// assert_eq!(CertType::Sign.file_id(), [0x00, 0x01]);
    /// ```
    #[must_use]
    pub const fn file_id(self) -> [u8; 2] {
        match self {
            Self::Auth => [0x00, 0x0A],
            Self::AuthCa => [0x00, 0x0B],
            Self::Sign => [0x00, 0x01],
            Self::SignCa => [0x00, 0x02],
        }
    }

    /// Whether reading this certificate requires a verified PIN.
    ///
    /// Only the signing certificate is PIN-gated; the others are protected
    /// by file access control alone.
    #[must_use]
    pub const fn is_pin_gated(self) -> bool {
        matches!(self, Self::Sign)
    }
}

/// One of the two private key slots of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeySlot {
    /// The document-signing key.
    #[serde(rename = "sign")]
    Sign,

    /// The session-authentication key.
    #[serde(rename = "auth")]
    Auth,
}

impl KeySlot {
    /// Returns the identifier of the private key file.
    #[must_use]
    pub const fn key_file_id(self) -> [u8; 2] {
        match self {
            Self::Sign => [0x00, 0x1A],
            Self::Auth => [0x00, 0x17],
        }
    }

    /// Returns the identifier of the PIN file guarding this slot.
    #[must_use]
    pub const fn pin_file_id(self) -> [u8; 2] {
        match self {
            Self::Sign => [0x00, 0x1B],
            Self::Auth => [0x00, 0x18],
        }
    }

    /// Returns a human-readable name for the slot.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sign => "signing",
            Self::Auth => "authentication",
        }
    }
}

/// A handle to the selected PKI application on a card.
///
/// Obtained via [`CryptoAp::open`]; all operations run over the owning
/// session's transport. See the module docs for lifecycle and PIN
/// semantics.
pub struct CryptoAp {
    /// Weak so the handle cannot keep the session's transport alive.
    session: Weak<SessionInner>,

    /// Set once by [`close`](Self::close) or drop.
    closed: AtomicBool,

    /// Latched when the card reports the signing PIN locked.
    sign_pin_locked: AtomicBool,

    /// Latched when the card reports the authentication PIN locked.
    auth_pin_locked: AtomicBool,
}

impl std::fmt::Debug for CryptoAp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoAp")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field(
                "sign_pin_locked",
                &self.sign_pin_locked.load(Ordering::SeqCst),
            )
            .field(
                "auth_pin_locked",
                &self.auth_pin_locked.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl CryptoAp {
    /// Selects the PKI application on the card and returns a handle to it.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterClose`] if the session is already closed; no
    ///   exchange is attempted in that case
    /// - [`Error::ApplicationSelect`] if the card reports anything but
    ///   success for the SELECT, i.e. the application is absent
    /// - transport errors from the exchange itself
    pub fn open(session: &CardSession) -> Result<Self> {
        if !session.is_open() {
            return Err(Error::UseAfterClose);
        }

        let apdu = Apdu::new(0x00, ins::SELECT, SELECT_P1_DF, SELECT_P2, AP_ID.to_vec());
        let response = session.inner().transmit(&apdu)?;
        if !response.is_success() {
            return Err(Error::ApplicationSelect(response.status_word()));
        }

        debug!("PKI application selected");

        Ok(Self {
            session: session.downgrade(),
            closed: AtomicBool::new(false),
            sign_pin_locked: AtomicBool::new(false),
            auth_pin_locked: AtomicBool::new(false),
        })
    }

    /// Reads the signing certificate, or its issuing CA certificate when
    /// `use_ca` is set.
    ///
    /// Verifies `pin` against the signing-PIN slot first; the read is only
    /// attempted after a successful VERIFY.
    ///
    /// # Errors
    ///
    /// - [`Error::PinVerification`] on a wrong PIN, carrying the remaining
    ///   attempt count
    /// - [`Error::PinLocked`] when the slot is locked
    /// - [`Error::UseAfterClose`] if this handle or the session is closed
    /// - card and transport errors from the exchanges
    pub fn read_certificate_sign(&self, pin: &[u8], use_ca: bool) -> Result<Vec<u8>> {
        let session = self.session()?;
        self.verify_pin(&session, KeySlot::Sign, pin)?;

        let ty = if use_ca {
            CertType::SignCa
        } else {
            CertType::Sign
        };
        self.read_certificate(&session, ty)
    }

    /// Reads the authentication certificate, or its issuing CA certificate
    /// when `use_ca` is set.
    ///
    /// No PIN is involved: the authentication certificate is readable by
    /// file access control alone, and no VERIFY command is issued.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterClose`] if this handle or the session is closed
    /// - card and transport errors from the exchanges
    pub fn read_certificate_auth(&self, use_ca: bool) -> Result<Vec<u8>> {
        let session = self.session()?;

        let ty = if use_ca {
            CertType::AuthCa
        } else {
            CertType::Auth
        };
        self.read_certificate(&session, ty)
    }

    /// Computes a signature over `digest` with the signing key.
    ///
    /// The digest is wrapped into the command payload untouched; hashing
    /// is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// - [`Error::PinVerification`] / [`Error::PinLocked`] from the VERIFY
    ///   step; the signature command is not sent in that case
    /// - [`Error::Signing`] if the card rejects the computation (e.g. a
    ///   digest length the key cannot accept)
    /// - [`Error::UseAfterClose`] if this handle or the session is closed
    pub fn sign(&self, pin: &[u8], digest: &[u8]) -> Result<Vec<u8>> {
        self.compute_signature(KeySlot::Sign, pin, digest)
    }

    /// Computes a signature over `digest` with the authentication key
    /// (internal-authenticate semantics).
    ///
    /// Same protocol shape and error behavior as [`sign`](Self::sign),
    /// against the authentication key slot and its PIN.
    pub fn auth(&self, pin: &[u8], digest: &[u8]) -> Result<Vec<u8>> {
        self.compute_signature(KeySlot::Auth, pin, digest)
    }

    /// Probes the remaining PIN attempts for a slot without consuming one.
    ///
    /// Sends a VERIFY with an empty PIN; the card answers with the retry
    /// counter. Returns `Some(0)` for a locked slot and `None` if the card
    /// reported success instead of a counter.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterClose`] if this handle or the session is closed
    /// - card and transport errors from the exchanges
    pub fn pin_remaining(&self, slot: KeySlot) -> Result<Option<u8>> {
        let session = self.session()?;
        self.select_file(&session, slot.pin_file_id())?;

        let apdu = Apdu::new(0x00, ins::VERIFY, 0x00, VERIFY_P2, vec![]);
        let response = session.transmit(&apdu)?;

        if response.is_success() {
            return Ok(None);
        }
        match response.to_error() {
            Error::PinVerification { remaining } => Ok(Some(remaining)),
            Error::PinLocked => Ok(Some(0)),
            err => Err(err),
        }
    }

    /// Closes the application handle.
    ///
    /// Idempotent, and deliberately independent of the session: the
    /// session stays open for other applications. After close, every
    /// operation fails with [`Error::UseAfterClose`].
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("crypto application handle closed");
        }
    }

    /// Returns `true` until this handle has been closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Resolves the owning session for one operation.
    fn session(&self) -> Result<Arc<SessionInner>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::UseAfterClose);
        }

        let session = self.session.upgrade().ok_or(Error::UseAfterClose)?;
        if !session.is_open() {
            return Err(Error::UseAfterClose);
        }

        Ok(session)
    }

    fn locked_flag(&self, slot: KeySlot) -> &AtomicBool {
        match slot {
            KeySlot::Sign => &self.sign_pin_locked,
            KeySlot::Auth => &self.auth_pin_locked,
        }
    }

    /// Selects the slot's PIN file and verifies the PIN against it.
    ///
    /// Short-circuits with [`Error::PinLocked`] once the slot is known to
    /// be locked, without issuing another VERIFY.
    fn verify_pin(&self, session: &SessionInner, slot: KeySlot, pin: &[u8]) -> Result<()> {
        let locked = self.locked_flag(slot);
        if locked.load(Ordering::SeqCst) {
            return Err(Error::PinLocked);
        }

        self.select_file(session, slot.pin_file_id())?;

        let mut apdu = Apdu::new(0x00, ins::VERIFY, 0x00, VERIFY_P2, pin.to_vec());
        let outcome = session.transmit(&apdu);
        apdu.zeroize();

        match outcome?.check() {
            Ok(()) => Ok(()),
            Err(Error::PinLocked) => {
                locked.store(true, Ordering::SeqCst);
                debug!("{} PIN reported locked by card", slot.name());
                Err(Error::PinLocked)
            }
            Err(err) => Err(err),
        }
    }

    fn select_file(&self, session: &SessionInner, id: [u8; 2]) -> Result<()> {
        let apdu = Apdu::new(0x00, ins::SELECT, SELECT_P1_EF, SELECT_P2, id.to_vec());
        session.transmit(&apdu)?.check()
    }

    /// Reads the selected certificate file in full.
    ///
    /// Fetches a header probe first, decodes the DER-declared size, then
    /// loops READ BINARY from offset zero until the declared length is
    /// assembled.
    fn read_certificate(&self, session: &SessionInner, ty: CertType) -> Result<Vec<u8>> {
        self.select_file(session, ty.file_id())?;

        let header = self.read_binary(session, 0, DER_PROBE_LEN)?;
        let total = der::entire_size_from_prefix(&header)?;

        let mut certificate = Vec::with_capacity(total);
        while certificate.len() < total {
            let offset = certificate.len() as u16;
            let remaining = total - certificate.len();
            let le = remaining.min(256) as u16;

            let fragment = self.read_binary(session, offset, le)?;
            if fragment.is_empty() {
                return Err(Error::MalformedResponse(
                    "zero-length READ BINARY fragment".to_string(),
                ));
            }
            certificate.extend_from_slice(&fragment);
        }

        certificate.truncate(total);
        debug!("certificate read: {} bytes", certificate.len());
        Ok(certificate)
    }

    fn read_binary(&self, session: &SessionInner, offset: u16, le: u16) -> Result<Vec<u8>> {
        let [p1, p2] = offset.to_be_bytes();
        let apdu = Apdu::with_le(0x00, ins::READ_BINARY, p1, p2, vec![], le);
        let response = session.transmit(&apdu)?;
        response.check()?;
        Ok(response.into_data())
    }

    /// Verifies the slot's PIN, selects its private key file, and runs the
    /// signature computation.
    fn compute_signature(&self, slot: KeySlot, pin: &[u8], digest: &[u8]) -> Result<Vec<u8>> {
        let session = self.session()?;
        self.verify_pin(&session, slot, pin)?;
        self.select_file(&session, slot.key_file_id())?;

        let apdu = Apdu::with_le(
            SIGN_CLA,
            ins::COMPUTE_SIGNATURE,
            SIGN_P1,
            SIGN_P2,
            digest.to_vec(),
            256,
        );
        let response = session.transmit(&apdu)?;
        if !response.is_success() {
            // Keep the shared status-word classification; Signing is only
            // for codes nothing else claims.
            return Err(match response.to_error() {
                Error::CardProtocol(sw) => Error::Signing(sw),
                err => err,
            });
        }

        Ok(response.into_data())
    }
}

impl Drop for CryptoAp {
    fn drop(&mut self) {
        self.close();
    }
}
