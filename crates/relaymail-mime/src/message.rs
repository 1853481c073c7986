//! Outbound message assembly.

use crate::encoding::{encode_base64, encoded_len};
use crate::header::Headers;

/// Boundary token delimiting every part of a built message.
///
/// The token is fixed so that output is reproducible byte for byte. A body or
/// attachment name containing a line equal to `--mail-boundary` will corrupt
/// the structure for the receiving parser; callers that accept untrusted body
/// text should screen for it.
pub const BOUNDARY: &str = "mail-boundary";

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=\"utf-8\"";
const CRLF: &[u8] = b"\r\n";

/// A named binary attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attachment {
    filename: String,
    data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from a file name and raw bytes.
    #[must_use]
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// File name as given by the caller.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw attachment bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    // Always labelled text/plain; the payload is opaque to us.
    fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers
            .add("Content-Type", TEXT_PLAIN_UTF8)
            .add("Content-Transfer-Encoding", "base64")
            .add(
                "Content-Disposition",
                format!("attachment; filename={}", self.filename),
            )
            .add("Content-ID", format!("<{}>", self.filename));
        headers
    }
}

/// An outbound email: envelope-facing header fields, a plain-text body and
/// any number of attachments.
///
/// Nothing is validated here. Address checks belong to whoever puts the
/// message on the wire.
///
/// ```
/// use relaymail_mime::Message;
///
/// let mut message = Message::new(["to@domain.com"], "from@domain.com", "S", "B");
/// message.attach("notes.txt", b"hello".to_vec());
///
/// let wire = message.build();
/// assert!(wire.starts_with(b"From: from@domain.com\r\nTo: to@domain.com\r\n"));
/// assert!(wire.ends_with(b"--mail-boundary--"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    recipients: Vec<String>,
    sender: String,
    subject: String,
    body: String,
    attachments: Vec<Attachment>,
}

impl Message {
    /// Creates a message without attachments.
    pub fn new<I, S>(
        recipients: I,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    /// Appends an attachment. Order is preserved; duplicates are kept.
    pub fn attach(&mut self, filename: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.attachments.push(Attachment::new(filename, data));
    }

    /// Builder-style variant of [`Message::attach`].
    #[must_use]
    pub fn with_attachment(mut self, filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.attach(filename, data);
        self
    }

    /// Recipients, in the order given.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Sender address.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Body text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Attachments, in append order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Top-level header block.
    #[must_use]
    pub fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers
            .add("From", self.sender.as_str())
            .add("To", self.recipients.join(";"))
            .add("Subject", self.subject.as_str())
            .add("MIME-Version", "1.0")
            .add(
                "Content-Type",
                format!("multipart/mixed; boundary={BOUNDARY}"),
            );
        headers
    }

    /// Serializes the message into its wire form (RFC 2045 multipart/mixed).
    ///
    /// The layout is fixed: header block, a blank line, the body part, one
    /// part per attachment and the closing delimiter with no trailing CRLF.
    /// Identical inputs always produce identical bytes.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.estimated_len());

        self.headers().write_to(&mut out);
        out.extend_from_slice(CRLF);
        push_delimiter(&mut out);

        let mut body_headers = Headers::new();
        body_headers.add("Content-Type", TEXT_PLAIN_UTF8);
        body_headers.write_to(&mut out);
        out.extend_from_slice(CRLF);
        out.extend_from_slice(self.body.as_bytes());

        for attachment in &self.attachments {
            out.extend_from_slice(b"\r\n\r\n");
            push_delimiter(&mut out);
            attachment.headers().write_to(&mut out);
            out.extend_from_slice(CRLF);
            out.extend_from_slice(encode_base64(&attachment.data).as_bytes());
        }

        out.extend_from_slice(b"\r\n\r\n--");
        out.extend_from_slice(BOUNDARY.as_bytes());
        out.extend_from_slice(b"--");
        out
    }

    fn estimated_len(&self) -> usize {
        let attachments: usize = self
            .attachments
            .iter()
            .map(|a| 160 + 2 * a.filename.len() + encoded_len(a.data.len()))
            .sum();
        256 + self.body.len() + self.subject.len() + attachments
    }
}

fn push_delimiter(out: &mut Vec<u8>) {
    out.extend_from_slice(b"--");
    out.extend_from_slice(BOUNDARY.as_bytes());
    out.extend_from_slice(CRLF);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::encoding::decode_base64;
    use proptest::prelude::*;

    const FROM: &str = "from@outlook.com";
    const SUBJECT: &str = "test subject";
    const BODY: &str = "test body";

    fn three_recipients() -> Vec<&'static str> {
        vec!["test-1@outlook.com", "test-2@gmail.com", "test-3@mail.ru"]
    }

    /// Expected output written with LF for readability.
    fn crlf(text: &str) -> Vec<u8> {
        text.replace('\n', "\r\n").into_bytes()
    }

    #[test]
    fn no_attachments_one_recipient() {
        let message = Message::new(["to@outlook.com"], FROM, SUBJECT, BODY);
        let want = crlf(
            "From: from@outlook.com
To: to@outlook.com
Subject: test subject
MIME-Version: 1.0
Content-Type: multipart/mixed; boundary=mail-boundary

--mail-boundary
Content-Type: text/plain; charset=\"utf-8\"

test body

--mail-boundary--",
        );
        assert_eq!(String::from_utf8(message.build()).unwrap(), String::from_utf8(want).unwrap());
    }

    #[test]
    fn recipients_joined_with_semicolon() {
        let message = Message::new(three_recipients(), FROM, SUBJECT, BODY);
        let built = String::from_utf8(message.build()).unwrap();
        assert!(built.contains("\r\nTo: test-1@outlook.com;test-2@gmail.com;test-3@mail.ru\r\n"));
    }

    #[test]
    fn one_attachment() {
        let mut message = Message::new(three_recipients(), FROM, SUBJECT, BODY);
        message.attach("attachment_1.txt", b"attachment_1.txt".to_vec());

        let want = crlf(
            "From: from@outlook.com
To: test-1@outlook.com;test-2@gmail.com;test-3@mail.ru
Subject: test subject
MIME-Version: 1.0
Content-Type: multipart/mixed; boundary=mail-boundary

--mail-boundary
Content-Type: text/plain; charset=\"utf-8\"

test body

--mail-boundary
Content-Type: text/plain; charset=\"utf-8\"
Content-Transfer-Encoding: base64
Content-Disposition: attachment; filename=attachment_1.txt
Content-ID: <attachment_1.txt>

YXR0YWNobWVudF8xLnR4dA==

--mail-boundary--",
        );
        assert_eq!(message.build(), want);
    }

    #[test]
    fn two_attachments_keep_order() {
        let message = Message::new(three_recipients(), FROM, SUBJECT, BODY)
            .with_attachment("attachment_1.txt", b"attachment_1.txt".to_vec())
            .with_attachment("attachment_2.txt", b"attachment_2.txt".to_vec());

        let want = crlf(
            "From: from@outlook.com
To: test-1@outlook.com;test-2@gmail.com;test-3@mail.ru
Subject: test subject
MIME-Version: 1.0
Content-Type: multipart/mixed; boundary=mail-boundary

--mail-boundary
Content-Type: text/plain; charset=\"utf-8\"

test body

--mail-boundary
Content-Type: text/plain; charset=\"utf-8\"
Content-Transfer-Encoding: base64
Content-Disposition: attachment; filename=attachment_1.txt
Content-ID: <attachment_1.txt>

YXR0YWNobWVudF8xLnR4dA==

--mail-boundary
Content-Type: text/plain; charset=\"utf-8\"
Content-Transfer-Encoding: base64
Content-Disposition: attachment; filename=attachment_2.txt
Content-ID: <attachment_2.txt>

YXR0YWNobWVudF8yLnR4dA==

--mail-boundary--",
        );
        assert_eq!(message.build(), want);
    }

    #[test]
    fn scenario_single_recipient() {
        let message = Message::new(["to@domain.com"], "from@domain.com", "S", "B");
        let built = String::from_utf8(message.build()).unwrap();

        assert!(built.starts_with("From: from@domain.com\r\nTo: to@domain.com\r\nSubject: S\r\n"));
        assert!(built.contains("\r\n\r\nB\r\n\r\n--mail-boundary--"));
        assert!(built.ends_with("--mail-boundary--"));
        assert_eq!(built.matches("--mail-boundary\r\n").count(), 1);
        assert!(!built.contains("Content-Disposition"));
    }

    #[test]
    fn duplicate_attachments_are_kept() {
        let mut message = Message::new(["a@b.c"], "d@e.f", "s", "b");
        message.attach("same", b"1".to_vec());
        message.attach("same", b"1".to_vec());
        assert_eq!(message.attachments().len(), 2);
        let built = String::from_utf8(message.build()).unwrap();
        assert_eq!(built.matches("Content-ID: <same>").count(), 2);
    }

    #[test]
    fn accessors_reflect_construction() {
        let message = Message::new(vec!["x@y.z".to_string()], "me@y.z", "subj", "text")
            .with_attachment("a.bin", vec![0_u8, 255]);
        assert_eq!(message.recipients(), ["x@y.z"]);
        assert_eq!(message.sender(), "me@y.z");
        assert_eq!(message.subject(), "subj");
        assert_eq!(message.body(), "text");
        assert_eq!(message.attachments()[0].filename(), "a.bin");
        assert_eq!(message.attachments()[0].data(), &[0, 255]);
        assert_eq!(message.headers().get("mime-version"), Some("1.0"));
    }

    /// Extracts the Base64 payload of the attachment named `name`.
    fn attachment_payload<'a>(built: &'a str, name: &str) -> &'a str {
        let marker = format!("Content-ID: <{name}>\r\n\r\n");
        let start = built.find(&marker).unwrap() + marker.len();
        let len = built[start..].find("\r\n\r\n--").unwrap();
        &built[start..start + len]
    }

    fn address() -> impl Strategy<Value = String> {
        "[a-z0-9.]{1,12}@[a-z]{1,8}\\.[a-z]{2,3}"
    }

    proptest! {
        #[test]
        fn build_is_deterministic(
            recipients in prop::collection::vec(address(), 1..4),
            sender in address(),
            subject in "[ -~]{0,40}",
            body in "[ -~\r\n]{0,200}",
            files in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..4),
        ) {
            let make = || {
                let mut message = Message::new(recipients.clone(), sender.clone(), subject.clone(), body.clone());
                for (i, data) in files.iter().enumerate() {
                    message.attach(format!("file{i}.bin"), data.clone());
                }
                message.build()
            };
            prop_assert_eq!(make(), make());
        }

        #[test]
        fn structural_lines_end_with_crlf(
            recipients in prop::collection::vec(address(), 1..4),
            subject in "[ -~]{0,40}",
            body in "[ -~]{0,200}",
            files in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..4),
        ) {
            let mut message = Message::new(recipients, "from@domain.com", subject, body);
            for (i, data) in files.iter().enumerate() {
                message.attach(format!("file{i}.bin"), data.clone());
            }
            let built = message.build();
            for (i, byte) in built.iter().enumerate() {
                if *byte == b'\n' {
                    prop_assert!(i > 0 && built[i - 1] == b'\r', "bare LF at {}", i);
                }
            }
        }

        #[test]
        fn attachments_round_trip_in_order(
            files in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 0..5),
        ) {
            let mut message = Message::new(["to@domain.com"], "from@domain.com", "S", "B");
            for (i, data) in files.iter().enumerate() {
                message.attach(format!("file{i}.bin"), data.clone());
            }
            let built = String::from_utf8(message.build()).unwrap();

            prop_assert_eq!(built.matches("--mail-boundary\r\n").count(), files.len() + 1);
            let mut last = 0;
            for (i, data) in files.iter().enumerate() {
                let name = format!("file{i}.bin");
                let position = built.find(&format!("Content-ID: <{name}>")).unwrap();
                prop_assert!(position > last);
                last = position;
                let decoded = decode_base64(attachment_payload(&built, &name)).unwrap();
                prop_assert_eq!(&decoded, data);
            }
        }
    }
}
