//! # relaymail-mime
//!
//! Builds outbound `multipart/mixed` messages: a plain-text body followed by
//! any number of Base64-encoded attachments.
//!
//! ## Quick Start
//!
//! ```
//! use relaymail_mime::Message;
//!
//! let mut message = Message::new(
//!     ["alice@example.com", "bob@example.com"],
//!     "sender@example.com",
//!     "Quarterly report",
//!     "Numbers attached.",
//! );
//! message.attach("report.csv", b"q,total\n1,42\n".to_vec());
//!
//! let wire: Vec<u8> = message.build();
//! assert!(wire.ends_with(b"--mail-boundary--"));
//! ```
//!
//! ## Wire format
//!
//! Output is deterministic: the boundary token is the constant [`BOUNDARY`],
//! every structural line ends with CRLF, and attachments appear in the order
//! they were added. Every attachment is declared `text/plain; charset="utf-8"`
//! with `Content-Transfer-Encoding: base64`, whatever its actual content, so
//! that existing consumers of this format keep working.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod header;
mod message;

pub mod encoding;

pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Attachment, BOUNDARY, Message};
