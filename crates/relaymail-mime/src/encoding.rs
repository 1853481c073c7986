//! Transfer encoding helpers.
//!
//! Attachments are carried as a single unwrapped line of standard, padded
//! Base64. The decoder is lenient about whitespace so that bodies re-wrapped
//! by an intermediate relay still decode.

use crate::error::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encodes data as Base64 (standard alphabet, padded, no line wrapping).
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data, ignoring any ASCII whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Returns the length of the Base64 text produced for `len` input bytes.
#[must_use]
pub const fn encoded_len(len: usize) -> usize {
    len.div_ceil(3) * 4
}
