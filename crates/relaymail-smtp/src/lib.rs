//! # relaymail-smtp
//!
//! SMTP relay client that keeps one negotiated connection per [`Mailer`]
//! and reuses it across sends.
//!
//! ## Features
//!
//! - **Connection reuse**: [`Mailer::ensure_connected`] probes the held
//!   connection with `NOOP` and only reconnects when the probe fails
//! - **Negotiation**: greeting, `EHLO` with `HELO` fallback, `STARTTLS`
//!   whenever the relay offers it, then `AUTH PLAIN` or `AUTH LOGIN`
//! - **Cancellation**: dialing and negotiation honour a
//!   [`CancellationToken`] and a dial timeout
//! - **Header injection guard**: envelope addresses containing CR or LF are
//!   rejected before any I/O
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaymail_smtp::{CancellationToken, ConnectionConfig, Mailer};
//!
//! #[tokio::main]
//! async fn main() -> relaymail_smtp::Result<()> {
//!     let config = ConnectionConfig::new("smtp.example.com", 587)
//!         .credentials("user@example.com", "password");
//!     let mut mailer = Mailer::new(config);
//!
//!     mailer.ensure_connected(&CancellationToken::new()).await?;
//!     mailer
//!         .send(
//!             &["recipient@example.com"],
//!             "sender@example.com",
//!             b"Subject: Test\r\n\r\nHello, World!\r\n",
//!         )
//!         .await?;
//!     mailer.close().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Session codec and transport
//! - [`parser`]: Reply parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
mod config;
pub mod connection;
mod error;
mod mailer;
pub mod parser;
pub mod types;

pub use auth::AuthStrategy;
pub use config::{ConnectionConfig, DEFAULT_DIAL_TIMEOUT, TlsVersion};
pub use connection::{Client, Dialer, ServerInfo, SmtpStream, TcpDialer};
pub use error::{DataStage, Error, ProtocolError, Result};
pub use mailer::Mailer;
pub use tokio_util::sync::CancellationToken;
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
