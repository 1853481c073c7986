//! Error types for SMTP operations.

use std::fmt;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single protocol exchange on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Host name not usable as a TLS server name.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Server answered with a reply code other than the one expected.
    #[error("SMTP error {code}: {message}")]
    Reply {
        /// Reply code (e.g., 550).
        code: u16,
        /// Message text from server.
        message: String,
    },

    /// Server sent something that is not a valid reply.
    #[error("Malformed reply: {0}")]
    Malformed(String),

    /// Server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// Credentials would have been sent in the clear to a remote host.
    #[error("Refusing to send credentials over an unencrypted connection to {0}")]
    Unencrypted(String),
}

impl ProtocolError {
    /// Creates a reply error from a reply code and message.
    #[must_use]
    pub fn reply(code: u16, message: impl Into<String>) -> Self {
        Self::Reply {
            code,
            message: message.into(),
        }
    }

    /// Returns the server reply code, if this error carries one.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Reply { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Reply { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Reply { code, .. } if *code >= 400 && *code < 500)
    }
}

/// Step of the `DATA` exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStage {
    /// `DATA` command was not answered with 354.
    Open,
    /// Writing the message content failed.
    Write,
    /// Writing the terminator or reading the final reply failed.
    Finish,
}

impl fmt::Display for DataStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "opening data channel"),
            Self::Write => write!(f, "writing message"),
            Self::Finish => write!(f, "finishing message"),
        }
    }
}

/// Errors returned by [`Mailer`](crate::Mailer) operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Could not open a connection to the relay.
    #[error("Failed to connect to {address}: {source}")]
    Dial {
        /// `host:port` that was dialed.
        address: String,
        /// Underlying transport error (`TimedOut` when the dial timeout elapsed).
        #[source]
        source: io::Error,
    },

    /// Connection attempt was cancelled by the caller.
    #[error("Connection attempt cancelled")]
    Cancelled,

    /// Greeting or `EHLO`/`HELO` failed.
    #[error("Greeting failed: {0}")]
    Greeting(#[source] ProtocolError),

    /// `STARTTLS` or the TLS handshake failed.
    #[error("TLS upgrade failed: {0}")]
    Upgrade(#[source] ProtocolError),

    /// Authentication exchange failed.
    #[error("Authentication failed: {0}")]
    Auth(#[source] ProtocolError),

    /// Credentials are configured but the server does not offer `AUTH`.
    #[error("Server does not support the AUTH extension")]
    UnsupportedAuthExtension,

    /// No open connection; call `connect` or `ensure_connected` first.
    #[error("Not connected")]
    NotConnected,

    /// Address contains a CR or LF character.
    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    /// Server rejected the sender or a recipient.
    #[error("Server rejected {address}: {source}")]
    EnvelopeRejected {
        /// The rejected address.
        address: String,
        /// Server reply or transport error.
        #[source]
        source: ProtocolError,
    },

    /// Message transmission failed.
    #[error("Failed {stage}: {source}")]
    Transmission {
        /// Step that failed.
        stage: DataStage,
        /// Server reply or transport error.
        #[source]
        source: ProtocolError,
    },

    /// `QUIT` failed. The connection is released anyway.
    #[error("Failed to close connection: {0}")]
    Close(#[source] ProtocolError),
}

impl Error {
    /// Returns the underlying protocol error, if any.
    #[must_use]
    pub const fn protocol_error(&self) -> Option<&ProtocolError> {
        match self {
            Self::Greeting(e) | Self::Upgrade(e) | Self::Auth(e) | Self::Close(e) => Some(e),
            Self::EnvelopeRejected { source, .. } | Self::Transmission { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }

    /// Returns the server reply code behind this error, if any.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        self.protocol_error().and_then(ProtocolError::reply_code)
    }

    /// Returns true if the server reported a permanent failure (5xx).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.protocol_error().is_some_and(ProtocolError::is_permanent)
    }

    /// Returns true if the server reported a transient failure (4xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.protocol_error().is_some_and(ProtocolError::is_transient)
    }
}
