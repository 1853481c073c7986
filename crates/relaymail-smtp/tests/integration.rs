//! Integration tests for the connection manager.
//!
//! A scripted dialer hands the manager in-memory streams that replay canned
//! server replies and record everything the client writes.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use relaymail_mime::Message;
use relaymail_smtp::{
    CancellationToken, ConnectionConfig, DataStage, Dialer, Error, Mailer, ProtocolError,
    TlsVersion,
};

type Transcript = Arc<Mutex<Vec<u8>>>;

/// Mock stream that returns one reply line per read.
struct MockStream {
    /// Reply lines still to be delivered.
    lines: VecDeque<Vec<u8>>,
    /// Everything the client wrote, shared with the dialer.
    sent: Transcript,
    /// Once the script runs out, block forever instead of reporting EOF.
    stall: bool,
}

impl MockStream {
    fn new(script: &str, sent: Transcript, stall: bool) -> Self {
        Self {
            lines: script
                .split_inclusive("\r\n")
                .map(|line| line.as_bytes().to_vec())
                .collect(),
            sent,
            stall,
        }
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.lines.pop_front() {
            Some(line) => buf.put_slice(&line),
            None if self.stall => return Poll::Pending,
            None => {}
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Dialer that serves one script per dial and counts what it was asked to do.
#[derive(Default)]
struct ScriptedDialer {
    scripts: Mutex<VecDeque<String>>,
    sent: Transcript,
    dials: AtomicUsize,
    /// Server name and TLS floor passed to each upgrade.
    upgrades: Mutex<Vec<(String, TlsVersion)>>,
    stall: bool,
}

impl ScriptedDialer {
    fn new(scripts: &[&str]) -> Self {
        Self {
            scripts: Mutex::new(scripts.iter().map(|s| (*s).to_string()).collect()),
            ..Self::default()
        }
    }

    /// Streams from this dialer go silent instead of closing when their
    /// script is exhausted.
    fn stalling(scripts: &[&str]) -> Self {
        Self {
            stall: true,
            ..Self::new(scripts)
        }
    }

    fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    fn upgrades(&self) -> Vec<(String, TlsVersion)> {
        self.upgrades.lock().unwrap().clone()
    }

    fn transcript(&self) -> String {
        String::from_utf8(self.sent.lock().unwrap().clone()).unwrap()
    }
}

impl Dialer for ScriptedDialer {
    type Stream = MockStream;

    async fn dial(&self, _host: &str, _port: u16) -> io::Result<MockStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;
        Ok(MockStream::new(&script, Arc::clone(&self.sent), self.stall))
    }

    async fn upgrade(
        &self,
        stream: MockStream,
        server_name: &str,
        min_version: TlsVersion,
    ) -> Result<MockStream, ProtocolError> {
        self.upgrades
            .lock()
            .unwrap()
            .push((server_name.to_string(), min_version));
        Ok(stream)
    }
}

/// Dialer whose connections never complete.
struct HangingDialer;

impl Dialer for HangingDialer {
    type Stream = MockStream;

    async fn dial(&self, _host: &str, _port: u16) -> io::Result<MockStream> {
        std::future::pending().await
    }

    async fn upgrade(
        &self,
        stream: MockStream,
        _server_name: &str,
        _min_version: TlsVersion,
    ) -> Result<MockStream, ProtocolError> {
        Ok(stream)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const GREETING: &str = "220 localhost ESMTP ready\r\n250-localhost greets localhost\r\n250 8BITMIME\r\n";

fn local_config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", 2525)
}

async fn connected(scripts: &[&str], config: ConnectionConfig) -> Mailer<ScriptedDialer> {
    let mut mailer = Mailer::with_dialer(config, ScriptedDialer::new(scripts));
    mailer.connect(&CancellationToken::new()).await.unwrap();
    mailer
}

#[tokio::test]
async fn test_send_before_connect() {
    init_tracing();
    let mut mailer = Mailer::with_dialer(local_config(), ScriptedDialer::new(&[GREETING]));

    let err = mailer
        .send(&["to@localhost"], "from@localhost", b"hello")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotConnected));
    assert_eq!(mailer.dialer().dials(), 0);
}

#[tokio::test]
async fn test_line_breaks_in_addresses_rejected_before_io() {
    init_tracing();

    // Not connected: validation wins over the missing connection
    let mut mailer = Mailer::with_dialer(local_config(), ScriptedDialer::new(&[GREETING]));
    let err = mailer
        .send(&["to@localhost"], "evil\r\nRCPT TO:<x@y>", b"hello")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(_)));
    assert_eq!(mailer.dialer().dials(), 0);

    // Connected: nothing is written
    let mut mailer = connected(&[GREETING], local_config()).await;
    let before = mailer.dialer().transcript();
    let err = mailer
        .send(&["ok@localhost", "bad@localhost\n"], "from@localhost", b"hello")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidAddress(addr) if addr == "bad@localhost\n"));
    assert_eq!(mailer.dialer().transcript(), before);
}

#[tokio::test]
async fn test_ensure_connected_reuses_live_connection() {
    init_tracing();
    let script = format!("{GREETING}250 ok\r\n");
    let mut mailer = Mailer::with_dialer(local_config(), ScriptedDialer::new(&[script.as_str()]));
    let cancel = CancellationToken::new();

    mailer.ensure_connected(&cancel).await.unwrap();
    mailer.ensure_connected(&cancel).await.unwrap();

    assert_eq!(mailer.dialer().dials(), 1);
    assert!(mailer.dialer().transcript().ends_with("NOOP\r\n"));
    assert!(mailer.is_connected());
}

#[tokio::test]
async fn test_failed_probe_reconnects() {
    init_tracing();
    // First connection goes silent after EHLO, so NOOP sees EOF
    let mut mailer = Mailer::with_dialer(local_config(), ScriptedDialer::new(&[GREETING, GREETING]));
    let cancel = CancellationToken::new();

    mailer.ensure_connected(&cancel).await.unwrap();
    mailer.ensure_connected(&cancel).await.unwrap();

    assert_eq!(mailer.dialer().dials(), 2);
    assert!(mailer.is_connected());
}

#[tokio::test]
async fn test_cancel_stops_stalled_noop() {
    init_tracing();
    // Server goes quiet after negotiation; NOOP never gets an answer
    let mut mailer =
        Mailer::with_dialer(local_config(), ScriptedDialer::stalling(&[GREETING]));
    mailer.connect(&CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), mailer.ensure_connected(&cancel))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(mailer.dialer().transcript().ends_with("NOOP\r\n"));
    assert!(!mailer.is_connected());
    assert_eq!(mailer.dialer().dials(), 1);
}

#[tokio::test]
async fn test_already_cancelled_token_skips_noop() {
    init_tracing();
    let mut mailer =
        Mailer::with_dialer(local_config(), ScriptedDialer::stalling(&[GREETING]));
    mailer.connect(&CancellationToken::new()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), mailer.ensure_connected(&cancel))
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(!mailer.is_connected());
    assert_eq!(mailer.dialer().dials(), 1);
}

#[tokio::test]
async fn test_helo_fallback() {
    init_tracing();
    let script = "220 legacy SMTP\r\n502 EHLO not implemented\r\n250 legacy\r\n";
    let mailer = connected(&[script], local_config()).await;

    let info = mailer.server_info().unwrap();
    assert_eq!(info.hostname, "legacy");
    assert!(info.extensions.is_empty());
    assert!(
        mailer
            .dialer()
            .transcript()
            .ends_with("EHLO localhost\r\nHELO localhost\r\n")
    );
}

#[tokio::test]
async fn test_auth_requires_extension() {
    init_tracing();
    let config = local_config().credentials("user", "pass");
    let mut mailer = Mailer::with_dialer(config, ScriptedDialer::new(&[GREETING]));

    let err = mailer.connect(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::UnsupportedAuthExtension));
    assert!(!mailer.dialer().transcript().contains("AUTH"));
    assert!(!mailer.is_connected());
}

#[tokio::test]
async fn test_plaintext_credentials_refused_for_remote_host() {
    init_tracing();
    let script = "220 mx.example.com\r\n250-mx.example.com\r\n250 AUTH PLAIN LOGIN\r\n";
    let config = ConnectionConfig::new("mx.example.com", 25).credentials("user", "pass");
    let mut mailer = Mailer::with_dialer(config, ScriptedDialer::new(&[script]));

    let err = mailer.connect(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::Auth(ProtocolError::Unencrypted(_))));
    assert!(!mailer.dialer().transcript().contains("AUTH"));
}

#[tokio::test]
async fn test_starttls_then_auth() {
    init_tracing();
    let script = concat!(
        "220 smtp.example.com ESMTP\r\n",
        "250-smtp.example.com\r\n250-STARTTLS\r\n250 SIZE 35882577\r\n",
        "220 2.0.0 ready to start TLS\r\n",
        "250-smtp.example.com\r\n250-AUTH LOGIN PLAIN\r\n250 SIZE 35882577\r\n",
        "235 2.7.0 accepted\r\n",
    );
    let config = ConnectionConfig::new("smtp.example.com", 587)
        .credentials("user", "pass")
        .client_name("client.example.org")
        .min_tls_version(TlsVersion::Tls13);
    let mailer = connected(&[script], config).await;

    // Identity is checked against the relay host, not the EHLO name
    assert_eq!(
        mailer.dialer().upgrades(),
        [("smtp.example.com".to_string(), TlsVersion::Tls13)]
    );
    assert_eq!(
        mailer.dialer().transcript(),
        concat!(
            "EHLO client.example.org\r\n",
            "STARTTLS\r\n",
            "EHLO client.example.org\r\n",
            "AUTH PLAIN AHVzZXIAcGFzcw==\r\n",
        )
    );

    let info = mailer.server_info().unwrap();
    assert!(info.supports_auth());
    assert!(!info.supports_starttls());
    assert_eq!(info.max_message_size(), Some(35_882_577));
}

#[tokio::test]
async fn test_starttls_refused() {
    init_tracing();
    let script = "220 mx\r\n250-mx\r\n250 STARTTLS\r\n454 TLS not available\r\n";
    let mut mailer = Mailer::with_dialer(local_config(), ScriptedDialer::new(&[script]));

    let err = mailer.connect(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, Error::Upgrade(_)));
    assert!(err.is_transient());
    assert!(mailer.dialer().upgrades().is_empty());
}

#[tokio::test]
async fn test_recipient_rejection_stops_send() {
    init_tracing();
    let script = format!("{GREETING}250 sender ok\r\n250 ok\r\n550 5.1.1 no such user\r\n");
    let mut mailer = connected(&[script.as_str()], local_config()).await;

    let err = mailer
        .send(
            &["a@localhost", "b@localhost", "c@localhost"],
            "from@localhost",
            b"hello",
        )
        .await
        .unwrap_err();

    match &err {
        Error::EnvelopeRejected { address, source } => {
            assert_eq!(address, "b@localhost");
            assert_eq!(source.reply_code(), Some(550));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_permanent());

    let transcript = mailer.dialer().transcript();
    assert!(transcript.contains("RCPT TO:<b@localhost>\r\n"));
    assert!(!transcript.contains("c@localhost"));
    assert!(!transcript.contains("DATA"));
    assert!(mailer.is_connected());
}

#[tokio::test]
async fn test_data_refused() {
    init_tracing();
    let script = format!("{GREETING}250 ok\r\n250 ok\r\n554 no valid recipients\r\n");
    let mut mailer = connected(&[script.as_str()], local_config()).await;

    let err = mailer
        .send(&["a@localhost"], "from@localhost", b"hello")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transmission {
            stage: DataStage::Open,
            ..
        }
    ));
    assert!(mailer.is_connected());
}

#[tokio::test]
async fn test_message_rejected_after_data() {
    init_tracing();
    let script = format!("{GREETING}250 ok\r\n250 ok\r\n354 go ahead\r\n452 4.3.1 out of storage\r\n");
    let mut mailer = connected(&[script.as_str()], local_config()).await;

    let err = mailer
        .send(&["a@localhost"], "from@localhost", b"hello")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Transmission {
            stage: DataStage::Finish,
            ..
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_send_built_message() {
    init_tracing();
    let script = format!("{GREETING}250 ok\r\n250 ok\r\n250 ok\r\n354 go ahead\r\n250 queued\r\n");
    let mut mailer = connected(&[script.as_str()], local_config()).await;

    let recipients = ["a@localhost", "b@localhost"];
    let mut message = Message::new(recipients, "from@localhost", "Report", ".hidden line");
    message.attach("data.txt", b"payload".to_vec());
    let payload = message.build();

    mailer
        .send(&recipients, "from@localhost", &payload)
        .await
        .unwrap();

    let transcript = mailer.dialer().transcript();
    assert!(transcript.contains("MAIL FROM:<from@localhost> BODY=8BITMIME\r\n"));
    assert!(transcript.contains("RCPT TO:<a@localhost>\r\nRCPT TO:<b@localhost>\r\nDATA\r\n"));
    assert!(transcript.contains("To: a@localhost;b@localhost\r\n"));
    assert!(transcript.contains("\r\n\r\n..hidden line\r\n"));
    assert!(transcript.contains("Content-Disposition: attachment; filename=data.txt\r\n"));
    assert!(transcript.ends_with("--mail-boundary--\r\n.\r\n"));
}

#[tokio::test]
async fn test_close_sends_quit() {
    init_tracing();
    let script = format!("{GREETING}221 2.0.0 bye\r\n");
    let mut mailer = connected(&[script.as_str()], local_config()).await;

    mailer.close().await.unwrap();

    assert!(!mailer.is_connected());
    assert!(mailer.dialer().transcript().ends_with("QUIT\r\n"));
}

#[tokio::test]
async fn test_connect_replaces_existing_connection() {
    init_tracing();
    let mut mailer = connected(&[GREETING, GREETING], local_config()).await;

    mailer.connect(&CancellationToken::new()).await.unwrap();

    assert_eq!(mailer.dialer().dials(), 2);
    assert!(!mailer.dialer().transcript().contains("QUIT"));
}

#[tokio::test]
async fn test_cancelled_before_dial() {
    init_tracing();
    let mut mailer = Mailer::with_dialer(local_config(), ScriptedDialer::new(&[GREETING]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = mailer.connect(&cancel).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(mailer.dialer().dials(), 0);
    assert!(!mailer.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_dial() {
    init_tracing();
    let mut mailer = Mailer::with_dialer(local_config(), HangingDialer);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = mailer.connect(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn test_dial_timeout() {
    init_tracing();
    let config = local_config().dial_timeout(Duration::from_secs(5));
    let mut mailer = Mailer::with_dialer(config, HangingDialer);

    let err = mailer.connect(&CancellationToken::new()).await.unwrap_err();

    match err {
        Error::Dial { address, source } => {
            assert_eq!(address, "localhost:2525");
            assert_eq!(source.kind(), io::ErrorKind::TimedOut);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
