//! Error types for message encoding helpers.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from decoding encoded message content.
///
/// Building a message never fails; only reading encoded parts back can.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Attachment text is not valid standard Base64.
    #[error("Invalid base64 content: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
