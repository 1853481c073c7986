//! Transport layer: dialing the relay and upgrading to TLS.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use crate::config::TlsVersion;
use crate::error::ProtocolError;

/// Opens byte streams to a relay and upgrades them to TLS.
///
/// [`TcpDialer`] is the production implementation. Other implementations
/// can hand the [`Mailer`](crate::Mailer) in-memory streams.
pub trait Dialer: Send + Sync {
    /// Stream type produced by this dialer.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a stream to `host:port`.
    fn dial(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Runs the TLS handshake over `stream`, verifying the peer as
    /// `server_name` and refusing anything older than `min_version`.
    fn upgrade(
        &self,
        stream: Self::Stream,
        server_name: &str,
        min_version: TlsVersion,
    ) -> impl Future<Output = Result<Self::Stream, ProtocolError>> + Send;
}

/// Dials over TCP and upgrades with rustls, trusting the webpki roots.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = SmtpStream;

    async fn dial(&self, host: &str, port: u16) -> io::Result<SmtpStream> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;
        Ok(SmtpStream::Plain(tcp))
    }

    async fn upgrade(
        &self,
        stream: SmtpStream,
        server_name: &str,
        min_version: TlsVersion,
    ) -> Result<SmtpStream, ProtocolError> {
        stream.upgrade_to_tls(server_name, min_version).await
    }
}

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Plain(TcpStream),
    /// TLS-encrypted connection (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl SmtpStream {
    /// Upgrades a plain stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted, the host is not a
    /// valid server name, or the handshake fails.
    pub async fn upgrade_to_tls(
        self,
        server_name: &str,
        min_version: TlsVersion,
    ) -> Result<Self, ProtocolError> {
        let tcp = match self {
            Self::Plain(tcp) => tcp,
            Self::Tls(_) => return Err(ProtocolError::Malformed("Already using TLS".into())),
        };

        let connector = create_tls_connector(min_version);
        let server_name = ServerName::try_from(server_name.to_string())?;
        let tls = connector.connect(server_name, tcp).await?;
        Ok(Self::Tls(Box::new(tls)))
    }
}

impl AsyncRead for SmtpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SmtpStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with webpki root certificates and the given
/// protocol floor.
fn create_tls_connector(min_version: TlsVersion) -> TlsConnector {
    let root_store = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = ClientConfig::builder_with_protocol_versions(min_version.protocol_versions())
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
