//! SMTP command builder.

use crate::types::{Address, AuthMechanism};

/// SMTP command sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// Base64 answer to a 334 challenge
    AuthResponse(String),
    /// `*` - Abort an authentication exchange
    AuthCancel,
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// BODY parameter (8BITMIME)
        body: Option<&'static str>,
        /// SMTPUTF8 parameter
        smtputf8: bool,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes, CRLF included.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::StartTls => {
                buf.extend_from_slice(b"STARTTLS");
            }
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTH ");
                buf.extend_from_slice(mechanism.as_str().as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    buf.extend_from_slice(resp.as_bytes());
                }
            }
            Self::AuthResponse(resp) => {
                buf.extend_from_slice(resp.as_bytes());
            }
            Self::AuthCancel => {
                buf.push(b'*');
            }
            Self::MailFrom {
                from,
                body,
                smtputf8,
            } => {
                buf.extend_from_slice(b"MAIL FROM:<");
                buf.extend_from_slice(from.as_str().as_bytes());
                buf.push(b'>');
                if let Some(body_type) = body {
                    buf.extend_from_slice(b" BODY=");
                    buf.extend_from_slice(body_type.as_bytes());
                }
                if *smtputf8 {
                    buf.extend_from_slice(b" SMTPUTF8");
                }
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO:<");
                buf.extend_from_slice(to.as_str().as_bytes());
                buf.push(b'>');
            }
            Self::Data => {
                buf.extend_from_slice(b"DATA");
            }
            Self::Noop => {
                buf.extend_from_slice(b"NOOP");
            }
            Self::Quit => {
                buf.extend_from_slice(b"QUIT");
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Verb used in log output. Never includes arguments, so credentials
    /// and addresses stay out of logs.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::AuthResponse(_) => "AUTH-RESPONSE",
            Self::AuthCancel => "AUTH-CANCEL",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }
}

/// Prepares message content for the `DATA` phase.
///
/// Bare LF becomes CRLF, lines starting with `.` get an extra `.` and the
/// result always ends with CRLF so the `.` terminator sits on its own line.
/// The terminator itself is not included.
#[must_use]
pub fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload.len() / 64 + 2);
    let mut line_start = true;
    let mut prev = None;

    for &byte in payload {
        if line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && prev != Some(b'\r') {
            out.push(b'\r');
        }
        out.push(byte);
        line_start = byte == b'\n';
        prev = Some(byte);
    }

    if !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn greeting_commands() {
        let ehlo = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(ehlo.serialize(), b"EHLO client.example.com\r\n");

        let helo = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(helo.serialize(), b"HELO client.example.com\r\n");
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }

    #[test]
    fn auth_commands() {
        let plain = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(plain.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");

        let login = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(login.serialize(), b"AUTH LOGIN\r\n");
        assert_eq!(Command::AuthResponse("dXNlcg==".into()).serialize(), b"dXNlcg==\r\n");
        assert_eq!(Command::AuthCancel.serialize(), b"*\r\n");
    }

    #[test]
    fn mail_from_variants() {
        let simple = Command::MailFrom {
            from: addr("sender@example.com"),
            body: None,
            smtputf8: false,
        };
        assert_eq!(simple.serialize(), b"MAIL FROM:<sender@example.com>\r\n");

        let extended = Command::MailFrom {
            from: addr("sender@example.com"),
            body: Some("8BITMIME"),
            smtputf8: true,
        };
        assert_eq!(
            extended.serialize(),
            b"MAIL FROM:<sender@example.com> BODY=8BITMIME SMTPUTF8\r\n"
        );

        let null_sender = Command::MailFrom {
            from: addr(""),
            body: None,
            smtputf8: false,
        };
        assert_eq!(null_sender.serialize(), b"MAIL FROM:<>\r\n");
    }

    #[test]
    fn envelope_and_session_commands() {
        let rcpt = Command::RcptTo {
            to: addr("recipient@example.com"),
        };
        assert_eq!(rcpt.serialize(), b"RCPT TO:<recipient@example.com>\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Noop.serialize(), b"NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn verb_hides_arguments() {
        let auth = Command::AuthResponse("c2VjcmV0".into());
        assert_eq!(auth.verb(), "AUTH-RESPONSE");
        assert_eq!(Command::Noop.verb(), "NOOP");
    }

    #[test]
    fn dot_stuff_normalizes_line_endings() {
        assert_eq!(dot_stuff(b"a\nb"), b"a\r\nb\r\n");
        assert_eq!(dot_stuff(b"a\r\nb\r\n"), b"a\r\nb\r\n");
    }

    #[test]
    fn dot_stuff_escapes_leading_dots() {
        assert_eq!(dot_stuff(b".hidden\r\nok\r\n..x"), b"..hidden\r\nok\r\n...x\r\n");
        assert_eq!(dot_stuff(b"a.b\n."), b"a.b\r\n..\r\n");
    }

    #[test]
    fn dot_stuff_empty_payload() {
        assert_eq!(dot_stuff(b""), b"\r\n");
    }

    #[test]
    fn dot_stuff_keeps_built_message_intact() {
        let payload = b"From: a@b.c\r\n\r\nbody\r\n\r\n--mail-boundary--";
        assert_eq!(
            dot_stuff(payload),
            b"From: a@b.c\r\n\r\nbody\r\n\r\n--mail-boundary--\r\n"
        );
    }
}
