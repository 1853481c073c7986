//! Connection configuration types.

use std::fmt;
use std::time::Duration;

/// Default time allowed for the TCP dial.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Lowest TLS protocol version accepted after `STARTTLS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TlsVersion {
    /// TLS 1.2 or newer.
    #[default]
    Tls12,
    /// TLS 1.3 only.
    Tls13,
}

impl TlsVersion {
    /// Protocol versions rustls may negotiate under this floor.
    #[must_use]
    pub fn protocol_versions(self) -> &'static [&'static rustls::SupportedProtocolVersion] {
        match self {
            Self::Tls12 => TLS12_AND_UP,
            Self::Tls13 => TLS13_ONLY,
        }
    }
}

static TLS12_AND_UP: &[&rustls::SupportedProtocolVersion] =
    &[&rustls::version::TLS13, &rustls::version::TLS12];
static TLS13_ONLY: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

/// Relay endpoint and credentials for one [`Mailer`](crate::Mailer).
///
/// An empty login means the relay is used without authentication.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConnectionConfig {
    /// Relay hostname; also the TLS server name checked after `STARTTLS`.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Login for authentication.
    pub login: String,
    /// Password for authentication.
    pub password: String,
    /// Name announced in `EHLO`/`HELO`. Falls back to `host` when empty.
    pub client_name: String,
    /// Time allowed for the TCP dial.
    pub dial_timeout: Duration,
    /// Lowest acceptable TLS version.
    pub min_tls_version: TlsVersion,
}

impl ConnectionConfig {
    /// Creates a configuration without credentials.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.login = login.into();
        self.password = password.into();
        self
    }

    /// Sets the name announced in `EHLO`/`HELO`.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets the dial timeout.
    #[must_use]
    pub const fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets the TLS version floor.
    #[must_use]
    pub const fn min_tls_version(mut self, version: TlsVersion) -> Self {
        self.min_tls_version = version;
        self
    }

    /// Name to announce in `EHLO`/`HELO`.
    #[must_use]
    pub fn greeting_name(&self) -> &str {
        if self.client_name.is_empty() {
            &self.host
        } else {
            &self.client_name
        }
    }

    /// `host:port`, with IPv6 literals bracketed.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 25,
            login: String::new(),
            password: String::new(),
            client_name: String::new(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            min_tls_version: TlsVersion::default(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("client_name", &self.client_name)
            .field("dial_timeout", &self.dial_timeout)
            .field("min_tls_version", &self.min_tls_version)
            .finish()
    }
}
