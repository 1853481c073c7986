//! One open SMTP session over a byte stream.

use std::collections::HashSet;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use super::ServerInfo;
use crate::command::{Command, dot_stuff};
use crate::error::ProtocolError;
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, Extension, Reply, ReplyCode};

type Result<T> = std::result::Result<T, ProtocolError>;

/// An open SMTP session.
///
/// Each method performs one command/reply exchange and checks the reply
/// code. Sequencing (what to send when) is up to the caller.
#[derive(Debug)]
pub struct Client<S> {
    reader: BufReader<S>,
    server_info: ServerInfo,
    encrypted: bool,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a freshly opened stream and reads the `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the server does not greet with 220.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            reader: BufReader::new(stream),
            server_info: ServerInfo::default(),
            encrypted: false,
        };

        let greeting = client.read_reply().await?.expect_code(ReplyCode::SERVICE_READY)?;
        client.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %client.server_info.hostname, "greeted");

        Ok(client)
    }

    /// Continues a session over a stream that was just upgraded to TLS.
    ///
    /// Capabilities are cleared; send `EHLO` again before relying on them.
    #[must_use]
    pub fn resume_encrypted(stream: S, hostname: String) -> Self {
        Self {
            reader: BufReader::new(stream),
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            encrypted: true,
        }
    }

    /// Server information gathered so far.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true once the session runs over TLS.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Sends `EHLO` and records the advertised extensions.
    ///
    /// Falls back to `HELO` (no extensions) when `EHLO` fails for any reason.
    ///
    /// # Errors
    ///
    /// Returns the `HELO` error if both greetings fail.
    pub async fn hello(&mut self, client_name: &str) -> Result<()> {
        let ehlo = Command::Ehlo {
            hostname: client_name.to_string(),
        };

        match self.send_command(&ehlo).await {
            Ok(reply) if reply.is_success() => {
                // First line is the server greeting, the rest are extensions
                self.server_info.extensions = reply
                    .message
                    .iter()
                    .skip(1)
                    .filter_map(|line| Extension::parse(line))
                    .collect();
                return Ok(());
            }
            Ok(reply) => debug!(code = %reply.code, "EHLO rejected, falling back to HELO"),
            Err(e) => debug!(error = %e, "EHLO failed, falling back to HELO"),
        }

        self.server_info.extensions.clear();
        self.send_command(&Command::Helo {
            hostname: client_name.to_string(),
        })
        .await?
        .expect_success()?;
        Ok(())
    }

    /// Sends `STARTTLS` and hands back the raw stream for the handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 220.
    pub async fn starttls(mut self) -> Result<(S, String)> {
        self.send_command(&Command::StartTls)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;
        Ok((self.reader.into_inner(), self.server_info.hostname))
    }

    /// Sends `NOOP`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is gone or the server does not
    /// answer 250.
    pub async fn noop(&mut self) -> Result<()> {
        self.send_command(&Command::Noop)
            .await?
            .expect_code(ReplyCode::OK)?;
        Ok(())
    }

    /// Sends `MAIL FROM`, adding `BODY=8BITMIME` and `SMTPUTF8` when the
    /// server advertises them.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the sender.
    pub async fn mail_from(&mut self, from: &Address) -> Result<()> {
        let cmd = Command::MailFrom {
            from: from.clone(),
            body: self
                .server_info
                .supports(&Extension::EightBitMime)
                .then_some("8BITMIME"),
            smtputf8: self.server_info.supports(&Extension::SmtpUtf8),
        };
        self.send_command(&cmd).await?.expect_success()?;
        Ok(())
    }

    /// Sends `RCPT TO`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the recipient.
    pub async fn rcpt_to(&mut self, to: &Address) -> Result<()> {
        self.send_command(&Command::RcptTo { to: to.clone() })
            .await?
            .expect_success()?;
        Ok(())
    }

    /// Sends `DATA` and waits for the 354 go-ahead.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not answer 354.
    pub async fn data(&mut self) -> Result<()> {
        self.send_command(&Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;
        Ok(())
    }

    /// Writes message content after a successful [`Client::data`].
    ///
    /// Content is dot-stuffed and line endings normalized to CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(&dot_stuff(payload)).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Writes the `.` terminator and waits for the server to accept the
    /// message.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or the server rejects the message.
    pub async fn finish_message(&mut self) -> Result<Reply> {
        self.write_raw(b".\r\n").await?;
        self.read_reply().await?.expect_success()
    }

    /// Sends `QUIT` and shuts the stream down.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the server does not answer
    /// 221 (or another 2xx).
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(&Command::Quit).await?;
        if reply.code != ReplyCode::CLOSING {
            reply.expect_success()?;
        }

        // The server may already have dropped its side after 221.
        if let Err(e) = self.reader.get_mut().shutdown().await {
            debug!(error = %e, "shutdown after QUIT failed");
        }
        Ok(())
    }

    /// Sends one command and reads its reply without checking the code.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or reading fails or the reply is malformed.
    pub async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.verb(), "sending");
        self.write_raw(&cmd.serialize()).await?;
        let reply = self.read_reply().await?;
        debug!(command = cmd.verb(), code = %reply.code, "reply");
        Ok(reply)
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }

            let is_last = is_last_reply_line(line);
            lines.push(line.to_string());

            if is_last {
                break;
            }
        }

        parse_reply(&lines)
    }
}
