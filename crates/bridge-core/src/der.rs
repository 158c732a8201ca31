//! DER length probing for chunked certificate reads.
//!
//! Certificates are stored on the card as DER-encoded files whose length
//! is not reported by the file system. The read path fetches the first few
//! bytes, decodes the outer tag/length header, and uses the declared
//! content length to bound the READ BINARY loop.

use crate::error::{Error, Result};

/// Upper bound accepted for a declared certificate size.
///
/// READ BINARY addresses offsets with two bytes, so anything larger cannot
/// be retrieved and indicates a corrupt header.
const MAX_ENTIRE_SIZE: usize = 0xFFFF;

/// Computes the entire size (header plus content) of a DER element from a
/// partial prefix of its encoding.
///
/// Handles the high-tag-number form (a second identifier octet) and both
/// the short and long length forms.
///
/// # Errors
///
/// Returns [`Error::MalformedResponse`] if the prefix is too short to
/// contain the full header, or if the declared size is outside the
/// addressable range.
///
/// # Example
///
/// ```
/// use idcard_bridge_core::der::entire_size_from_prefix;
///
/// // SEQUENCE, long-form length 0x0101 => 4 header bytes + 257 content bytes
/// let prefix = [0x30, 0x82, 0x01, 0x01, 0x00, 0x00, 0x00];
/// assert_eq!(entire_size_from_prefix(&prefix).unwrap(), 4 + 257);
/// ```
pub fn entire_size_from_prefix(prefix: &[u8]) -> Result<usize> {
    let mut cursor = 0;

    let tag = next(prefix, &mut cursor)?;
    if tag & 0x1F == 0x1F {
        // High tag number form carries the tag in a follow-up octet.
        next(prefix, &mut cursor)?;
    }

    let head = next(prefix, &mut cursor)? as usize;
    let content_len = if head & 0x80 == 0 {
        head
    } else {
        let octets = head & 0x7F;
        if octets == 0 || octets > 4 {
            return Err(Error::MalformedResponse(
                "unsupported DER length encoding".to_string(),
            ));
        }

        let mut size = 0usize;
        for _ in 0..octets {
            size = (size << 8) | next(prefix, &mut cursor)? as usize;
        }
        size
    };

    let entire = cursor
        .checked_add(content_len)
        .filter(|&total| total <= MAX_ENTIRE_SIZE)
        .ok_or_else(|| {
            Error::MalformedResponse("declared DER size exceeds addressable range".to_string())
        })?;

    Ok(entire)
}

fn next(buffer: &[u8], cursor: &mut usize) -> Result<u8> {
    let byte = buffer
        .get(*cursor)
        .copied()
        .ok_or_else(|| Error::MalformedResponse("truncated DER header".to_string()))?;
    *cursor += 1;
    Ok(byte)
}
