//! APDU (Application Protocol Data Unit) command and response types.
//!
//! This module provides types for constructing and parsing ISO 7816-4 APDU
//! commands and responses exchanged with the identity card.
//!
//! # APDU Command Structure
//!
//! ```text
//! | CLA | INS | P1 | P2 | Lc | Data | Le |
//! |-----|-----|----|----|----|------|----|
//! | 1B  | 1B  | 1B | 1B | 1B | Var  | 1B |
//! ```
//!
//! # APDU Response Structure
//!
//! ```text
//! | Data | SW1 | SW2 |
//! |------|-----|-----|
//! | Var  | 1B  | 1B  |
//! ```
//!
//! The two status-word bytes end every response and drive the error
//! classification in [`ApduResponse::to_error`].
//!
//! # Example
//!
//! ```
//! use idcard_bridge_core::apdu::Apdu;
//!
//! // SELECT file command
//! let apdu = Apdu::new(0x00, 0xA4, 0x02, 0x0C, vec![0x00, 0x1A]);
//! let bytes = apdu.to_bytes();
//! assert_eq!(&bytes[0..4], &[0x00, 0xA4, 0x02, 0x0C]);
//! ```

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// An APDU command.
///
/// Represents an ISO 7816-4 APDU command to be sent to the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte.
    cla: u8,

    /// Instruction byte.
    ins: u8,

    /// Parameter 1.
    p1: u8,

    /// Parameter 2.
    p2: u8,

    /// Command data.
    data: Vec<u8>,

    /// Expected response length (0 = none requested).
    le: u16,
}

impl Apdu {
    /// Maximum short APDU data length.
    pub const MAX_SHORT_DATA: usize = 255;

    /// Creates a new APDU command with no expected response data.
    #[must_use]
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le: 0,
        }
    }

    /// Creates a new APDU command with an expected response length.
    ///
    /// An `le` of 256 is encoded as `0x00` in short form, per ISO 7816-4.
    #[must_use]
    pub const fn with_le(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>, le: u16) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        }
    }

    /// Returns the class byte.
    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    /// Returns the instruction byte.
    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    /// Returns parameter 1.
    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Returns parameter 2.
    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Returns the command data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the expected response length.
    #[must_use]
    pub const fn le(&self) -> u16 {
        self.le
    }

    /// Serializes the APDU to bytes.
    ///
    /// Encodes in short form (Lc ≤ 255, Le ≤ 256) or extended form as
    /// appropriate.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.data.len() + 3);

        bytes.push(self.cla);
        bytes.push(self.ins);
        bytes.push(self.p1);
        bytes.push(self.p2);

        let use_extended = self.data.len() > Self::MAX_SHORT_DATA || self.le > 256;

        if use_extended {
            if !self.data.is_empty() {
                bytes.push(0x00); // Extended Lc marker
                bytes.push((self.data.len() >> 8) as u8);
                bytes.push(self.data.len() as u8);
                bytes.extend_from_slice(&self.data);
            }
            if self.le > 0 {
                if self.data.is_empty() {
                    bytes.push(0x00); // Extended Le marker
                }
                bytes.push((self.le >> 8) as u8);
                bytes.push(self.le as u8);
            }
        } else {
            if !self.data.is_empty() {
                bytes.push(self.data.len() as u8);
                bytes.extend_from_slice(&self.data);
            }
            if self.le > 0 {
                bytes.push(if self.le == 256 { 0x00 } else { self.le as u8 });
            }
        }

        bytes
    }
}

impl Zeroize for Apdu {
    /// Scrubs the command data in place. Used for PIN-bearing commands,
    /// which must not outlive their exchange.
    fn zeroize(&mut self) {
        self.data.zeroize();
    }
}

/// An APDU response from the card.
///
/// Contains the response data and the status word indicating success or a
/// specific failure class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data.
    data: Vec<u8>,

    /// Status word 1.
    sw1: u8,

    /// Status word 2.
    sw2: u8,
}

impl ApduResponse {
    /// Success status word (`0x9000`).
    pub const SW_SUCCESS: u16 = 0x9000;

    /// Creates a new APDU response from raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if the response is less than 2 bytes. The transport adapter
    /// rejects short responses with [`Error::MalformedResponse`] before
    /// constructing one.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        assert!(bytes.len() >= 2, "APDU response must be at least 2 bytes");

        let len = bytes.len();
        let sw1 = bytes[len - 2];
        let sw2 = bytes[len - 1];
        let data = bytes[..len - 2].to_vec();

        Self { data, sw1, sw2 }
    }

    /// Returns the response data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the response and returns the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns status word 1.
    #[must_use]
    pub const fn sw1(&self) -> u8 {
        self.sw1
    }

    /// Returns status word 2.
    #[must_use]
    pub const fn sw2(&self) -> u8 {
        self.sw2
    }

    /// Returns the full status word as a [`u16`].
    #[must_use]
    pub const fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Checks if the response indicates success (`SW = 0x9000`).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_word() == Self::SW_SUCCESS
    }

    /// Checks the response status.
    ///
    /// # Errors
    ///
    /// Returns the classified card error if the status word is not
    /// `0x9000`.
    pub const fn check(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self.to_error())
        }
    }

    /// Converts the status word to its classified error.
    ///
    /// Classification policy:
    ///
    /// - `0x63Cx`: wrong PIN, `x` attempts remaining (`x = 0` means the
    ///   PIN is now locked)
    /// - `0x6983`: PIN or key blocked
    /// - `0x6A88`: referenced data not found, treated as an incompatible
    ///   card
    /// - anything else: [`Error::CardProtocol`] carrying the raw code
    #[must_use]
    pub const fn to_error(&self) -> Error {
        match (self.sw1, self.sw2) {
            (0x63, 0xC0..=0xCF) => {
                let remaining = self.sw2 & 0x0F;
                if remaining == 0 {
                    Error::PinLocked
                } else {
                    Error::PinVerification { remaining }
                }
            }
            (0x69, 0x83) => Error::PinLocked,
            (0x6A, 0x88) => Error::IncompatibleCard,
            _ => Error::CardProtocol(self.status_word()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apdu_new() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x0C, vec![0xD3, 0x92]);

        assert_eq!(apdu.cla(), 0x00);
        assert_eq!(apdu.ins(), 0xA4);
        assert_eq!(apdu.p1(), 0x04);
        assert_eq!(apdu.p2(), 0x0C);
        assert_eq!(apdu.data(), &[0xD3, 0x92]);
        assert_eq!(apdu.le(), 0);
    }

    #[test]
    fn apdu_to_bytes_short() {
        let apdu = Apdu::new(0x00, 0xA4, 0x02, 0x0C, vec![0x00, 0x1A]);
        let bytes = apdu.to_bytes();

        assert_eq!(bytes, vec![0x00, 0xA4, 0x02, 0x0C, 0x02, 0x00, 0x1A]);
    }

    #[test]
    fn apdu_to_bytes_no_data() {
        let apdu = Apdu::new(0x00, 0xA4, 0x04, 0x0C, vec![]);
        let bytes = apdu.to_bytes();

        assert_eq!(bytes, vec![0x00, 0xA4, 0x04, 0x0C]);
    }

    #[test]
    fn apdu_to_bytes_le_256_encodes_as_zero() {
        let apdu = Apdu::with_le(0x00, 0xB0, 0x00, 0x00, vec![], 256);
        let bytes = apdu.to_bytes();

        assert_eq!(bytes, vec![0x00, 0xB0, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn apdu_to_bytes_short_le() {
        let apdu = Apdu::with_le(0x00, 0xB0, 0x00, 0x07, vec![], 7);
        let bytes = apdu.to_bytes();

        assert_eq!(bytes, vec![0x00, 0xB0, 0x00, 0x07, 0x07]);
    }

    #[test]
    fn apdu_to_bytes_payload_and_le() {
        let apdu = Apdu::with_le(0x80, 0x2A, 0x00, 0x80, vec![0xAA, 0xBB], 256);
        let bytes = apdu.to_bytes();

        assert_eq!(bytes, vec![0x80, 0x2A, 0x00, 0x80, 0x02, 0xAA, 0xBB, 0x00]);
    }

    #[test]
    fn apdu_zeroize_clears_data() {
        let mut apdu = Apdu::new(0x00, 0x20, 0x00, 0x80, vec![0x31, 0x32, 0x33, 0x34]);
        apdu.zeroize();

        assert!(apdu.data().is_empty());
    }

    #[test]
    fn apdu_response_new() {
        let response = ApduResponse::new(vec![0x01, 0x02, 0x03, 0x90, 0x00]);

        assert_eq!(response.data(), &[0x01, 0x02, 0x03]);
        assert_eq!(response.sw1(), 0x90);
        assert_eq!(response.sw2(), 0x00);
        assert!(response.is_success());
    }

    #[test]
    fn apdu_response_status_word() {
        let response = ApduResponse::new(vec![0x90, 0x00]);

        assert_eq!(response.status_word(), 0x9000);
        assert!(response.check().is_ok());
    }

    #[test]
    fn apdu_response_wrong_pin() {
        let response = ApduResponse::new(vec![0x63, 0xC2]);

        let err = response.to_error();
        assert!(matches!(err, Error::PinVerification { remaining: 2 }));
    }

    #[test]
    fn apdu_response_retry_counter_exhausted() {
        let response = ApduResponse::new(vec![0x63, 0xC0]);

        assert!(matches!(response.to_error(), Error::PinLocked));
    }

    #[test]
    fn apdu_response_pin_blocked() {
        let response = ApduResponse::new(vec![0x69, 0x83]);

        assert!(matches!(response.to_error(), Error::PinLocked));
    }

    #[test]
    fn apdu_response_referenced_data_not_found() {
        let response = ApduResponse::new(vec![0x6A, 0x88]);

        assert!(matches!(response.to_error(), Error::IncompatibleCard));
    }

    #[test]
    fn apdu_response_unclassified_status() {
        let response = ApduResponse::new(vec![0x67, 0x00]);

        assert!(matches!(response.to_error(), Error::CardProtocol(0x6700)));
    }

    #[test]
    fn apdu_response_into_data() {
        let response = ApduResponse::new(vec![0x01, 0x02, 0x90, 0x00]);
        assert_eq!(response.into_data(), vec![0x01, 0x02]);
    }
}
