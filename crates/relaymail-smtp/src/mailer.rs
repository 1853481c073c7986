//! Connection manager: one relay connection, negotiated on demand and reused.

use std::io;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::AuthStrategy;
use crate::config::ConnectionConfig;
use crate::connection::{Client, Dialer, ServerInfo, TcpDialer};
use crate::error::{DataStage, Error, Result};
use crate::types::Address;

/// Owns at most one negotiated connection to a relay.
///
/// Methods take `&mut self`; share a `Mailer` between tasks behind a
/// `tokio::sync::Mutex`.
///
/// # Example
///
/// ```ignore
/// use relaymail_smtp::{CancellationToken, ConnectionConfig, Mailer};
///
/// let config = ConnectionConfig::new("smtp.example.com", 587)
///     .credentials("user@example.com", "secret");
/// let mut mailer = Mailer::new(config);
///
/// mailer.ensure_connected(&CancellationToken::new()).await?;
/// mailer
///     .send(&["to@example.com"], "from@example.com", b"Subject: hi\r\n\r\nhello")
///     .await?;
/// mailer.close().await?;
/// ```
#[derive(Debug)]
pub struct Mailer<D: Dialer = TcpDialer> {
    config: ConnectionConfig,
    auth: Option<AuthStrategy>,
    dialer: D,
    handle: Option<Client<D::Stream>>,
}

impl Mailer<TcpDialer> {
    /// Creates a manager that dials over TCP. Does no I/O.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_dialer(config, TcpDialer)
    }
}

impl<D: Dialer> Mailer<D> {
    /// Creates a manager using a custom dialer. Does no I/O.
    #[must_use]
    pub fn with_dialer(config: ConnectionConfig, dialer: D) -> Self {
        let auth = AuthStrategy::from_config(&config);
        Self {
            config,
            auth,
            dialer,
            handle: None,
        }
    }

    /// The configuration this manager was created with.
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The dialer used to open connections, for reading state a custom
    /// [`Dialer`] keeps (counters, recorded handshakes).
    #[must_use]
    pub const fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Returns true while a negotiated connection is held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Greeting hostname and capabilities of the current connection.
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.handle.as_ref().map(Client::server_info)
    }

    /// Opens and negotiates a fresh connection, replacing any current one.
    ///
    /// Steps run in order: dial, greeting and `EHLO` (or `HELO`), `STARTTLS`
    /// when offered, then authentication when credentials are configured.
    /// `cancel` aborts any step.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, or [`Error::Cancelled`].
    /// No connection is held afterwards.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<()> {
        // Drop the old session without QUIT; it is being replaced.
        self.handle = None;

        let client = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(address = %self.config.address(), "connect cancelled");
                return Err(Error::Cancelled);
            }
            result = negotiate(&self.dialer, &self.config, self.auth.as_ref()) => result?,
        };

        info!(
            address = %self.config.address(),
            server = %client.server_info().hostname,
            encrypted = client.is_encrypted(),
            "connected"
        );
        self.handle = Some(client);
        Ok(())
    }

    /// Makes sure a usable connection is held.
    ///
    /// An existing connection is probed with `NOOP` and replaced if the probe
    /// fails; otherwise a new one is opened. `cancel` also bounds the probe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires while the probe is
    /// waiting (the connection is dropped), or the error from
    /// [`Mailer::connect`] if a new connection is needed and cannot be
    /// established.
    pub async fn ensure_connected(&mut self, cancel: &CancellationToken) -> Result<()> {
        if let Some(client) = self.handle.as_mut() {
            let liveness = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = client.noop() => Some(result),
            };

            match liveness {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => {
                    warn!(error = %e, "connection probe failed, reconnecting");
                    self.handle = None;
                }
                None => {
                    // A half-finished NOOP leaves the session out of step.
                    debug!(address = %self.config.address(), "probe cancelled");
                    self.handle = None;
                    return Err(Error::Cancelled);
                }
            }
        }

        self.connect(cancel).await
    }

    /// Sends one message over the current connection.
    ///
    /// All addresses are checked before anything is written. Recipients are
    /// submitted in order and the first rejection aborts the send. The
    /// connection is kept after a failure.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if any address contains CR or LF
    /// - [`Error::NotConnected`] if no connection is held
    /// - [`Error::EnvelopeRejected`] if the sender or a recipient is refused
    /// - [`Error::Transmission`] if the `DATA` exchange fails
    pub async fn send<R: AsRef<str>>(
        &mut self,
        recipients: &[R],
        sender: &str,
        payload: &[u8],
    ) -> Result<()> {
        let from = Address::new(sender)?;
        let to = recipients
            .iter()
            .map(|r| Address::new(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let client = self.handle.as_mut().ok_or(Error::NotConnected)?;

        client
            .mail_from(&from)
            .await
            .map_err(|source| Error::EnvelopeRejected {
                address: from.to_string(),
                source,
            })?;

        for rcpt in &to {
            client
                .rcpt_to(rcpt)
                .await
                .map_err(|source| Error::EnvelopeRejected {
                    address: rcpt.to_string(),
                    source,
                })?;
        }

        client.data().await.map_err(|source| Error::Transmission {
            stage: DataStage::Open,
            source,
        })?;
        client
            .write_message(payload)
            .await
            .map_err(|source| Error::Transmission {
                stage: DataStage::Write,
                source,
            })?;
        let reply = client
            .finish_message()
            .await
            .map_err(|source| Error::Transmission {
                stage: DataStage::Finish,
                source,
            })?;

        debug!(
            recipients = to.len(),
            bytes = payload.len(),
            reply = %reply.message_text(),
            "message accepted"
        );
        Ok(())
    }

    /// Sends `QUIT` and releases the connection. Does nothing when no
    /// connection is held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`] if `QUIT` fails; the connection is released
    /// regardless.
    pub async fn close(&mut self) -> Result<()> {
        let Some(client) = self.handle.take() else {
            return Ok(());
        };

        client.quit().await.map_err(Error::Close)?;
        info!(address = %self.config.address(), "connection closed");
        Ok(())
    }
}

/// Dials and negotiates one session.
async fn negotiate<D: Dialer>(
    dialer: &D,
    config: &ConnectionConfig,
    auth: Option<&AuthStrategy>,
) -> Result<Client<D::Stream>> {
    let address = config.address();
    debug!(%address, "dialing");

    let stream = match timeout(config.dial_timeout, dialer.dial(&config.host, config.port)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(Error::Dial { address, source }),
        Err(_) => {
            return Err(Error::Dial {
                address,
                source: io::Error::new(io::ErrorKind::TimedOut, "dial timed out"),
            });
        }
    };

    let mut client = Client::from_stream(stream).await.map_err(Error::Greeting)?;
    client
        .hello(config.greeting_name())
        .await
        .map_err(Error::Greeting)?;

    if client.server_info().supports_starttls() {
        debug!(server_name = %config.host, "upgrading with STARTTLS");
        let (stream, hostname) = client.starttls().await.map_err(Error::Upgrade)?;
        let stream = dialer
            .upgrade(stream, &config.host, config.min_tls_version)
            .await
            .map_err(Error::Upgrade)?;

        client = Client::resume_encrypted(stream, hostname);
        client
            .hello(config.greeting_name())
            .await
            .map_err(Error::Upgrade)?;
    }

    if let Some(auth) = auth {
        if !client.server_info().supports_auth() {
            return Err(Error::UnsupportedAuthExtension);
        }
        auth.authenticate(&mut client, &config.host)
            .await
            .map_err(Error::Auth)?;
    }

    Ok(client)
}
