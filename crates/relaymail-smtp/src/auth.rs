//! SASL exchanges run after the greeting.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::connection::Client;
use crate::error::ProtocolError;
use crate::types::{AuthMechanism, ReplyCode};

/// Hosts we are willing to send credentials to without TLS.
const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Credentials plus the logic to pick and run a mechanism.
#[derive(Clone)]
pub struct AuthStrategy {
    login: String,
    password: String,
}

impl AuthStrategy {
    /// Creates a strategy for the given credentials.
    #[must_use]
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Derives the strategy from a configuration; `None` when no login is set.
    #[must_use]
    pub fn from_config(config: &ConnectionConfig) -> Option<Self> {
        if config.login.is_empty() {
            None
        } else {
            Some(Self::new(config.login.clone(), config.password.clone()))
        }
    }

    /// Picks the mechanism to use against the advertised list.
    ///
    /// `PLAIN` wins when listed, `LOGIN` is used when it is the only one we
    /// know. A list naming nothing we know still gets `PLAIN`.
    #[must_use]
    pub fn select_mechanism(advertised: &[AuthMechanism]) -> AuthMechanism {
        if !advertised.contains(&AuthMechanism::Plain)
            && advertised.contains(&AuthMechanism::Login)
        {
            AuthMechanism::Login
        } else {
            AuthMechanism::Plain
        }
    }

    /// Runs the exchange on `client`.
    ///
    /// `host` is the configured relay host, used to allow plaintext
    /// credentials to loopback relays only.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Unencrypted`] without writing anything when
    /// the session is plaintext and `host` is not local, or the server's
    /// error when it rejects the credentials.
    pub async fn authenticate<S>(&self, client: &mut Client<S>, host: &str) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !client.is_encrypted() && !LOCAL_HOSTS.contains(&host) {
            return Err(ProtocolError::Unencrypted(host.to_string()));
        }

        let mechanism =
            Self::select_mechanism(client.server_info().auth_mechanisms().unwrap_or_default());
        debug!(mechanism = mechanism.as_str(), login = %self.login, "authenticating");

        match mechanism {
            AuthMechanism::Login => self.auth_login(client).await,
            _ => self.auth_plain(client).await,
        }
    }

    async fn auth_plain<S>(&self, client: &mut Client<S>) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let credentials = format!("\0{}\0{}", self.login, self.password);
        let reply = client
            .send_command(&Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(STANDARD.encode(credentials.as_bytes())),
            })
            .await?;

        if reply.code == ReplyCode::AUTH_CONTINUE {
            // PLAIN carries everything up front; a further challenge is
            // unexpected, so abort the exchange.
            let cancel = client.send_command(&Command::AuthCancel).await?;
            debug!(code = %cancel.code, "cancelled unexpected challenge");
            return Err(ProtocolError::Malformed(format!(
                "unexpected challenge during AUTH PLAIN: {}",
                reply.message_text()
            )));
        }

        reply.expect_code(ReplyCode::AUTH_SUCCEEDED)?;
        Ok(())
    }

    async fn auth_login<S>(&self, client: &mut Client<S>) -> Result<(), ProtocolError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        client
            .send_command(&Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;

        client
            .send_command(&Command::AuthResponse(STANDARD.encode(self.login.as_bytes())))
            .await?
            .expect_code(ReplyCode::AUTH_CONTINUE)?;

        client
            .send_command(&Command::AuthResponse(STANDARD.encode(self.password.as_bytes())))
            .await?
            .expect_code(ReplyCode::AUTH_SUCCEEDED)?;
        Ok(())
    }
}

impl fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStrategy")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}
