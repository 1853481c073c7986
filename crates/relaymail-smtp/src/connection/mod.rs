//! SMTP session and transport management.

mod client;
mod stream;

pub use client::Client;
pub use stream::{Dialer, SmtpStream, TcpDialer};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// What the server told us about itself during the greeting.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Extensions from the latest `EHLO` reply (empty after a `HELO` fallback).
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if AUTH is advertised, whatever the mechanisms.
    #[must_use]
    pub fn supports_auth(&self) -> bool {
        self.auth_mechanisms().is_some()
    }

    /// Returns the advertised authentication mechanisms we recognise, or
    /// `None` if AUTH is not advertised at all.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Option<&[AuthMechanism]> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Auth(mechanisms) => Some(mechanisms.as_slice()),
            _ => None,
        })
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }
}
