//! SMTP reply parser.

use crate::error::ProtocolError;
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from its lines (CRLF already stripped).
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK`
/// - Multi: `250-First line`, `250-Second line`, `250 Last line`
///
/// Every line must carry the same three-digit code.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the reply is empty, a line is too
/// short, a code is not numeric, or the codes disagree.
pub fn parse_reply(lines: &[String]) -> Result<Reply, ProtocolError> {
    let first = lines
        .first()
        .ok_or_else(|| ProtocolError::Malformed("Empty reply".into()))?;
    let code = parse_code(first)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_code(line)? != code {
            return Err(ProtocolError::Malformed(format!(
                "Reply code changed mid-reply: {line}"
            )));
        }
        // Skip code and separator (e.g., "250-" or "250 ")
        message.push(line.get(4..).unwrap_or_default().to_string());
    }

    Ok(Reply::new(ReplyCode::new(code), message))
}

fn parse_code(line: &str) -> Result<u16, ProtocolError> {
    let code = line
        .get(0..3)
        .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| ProtocolError::Malformed(format!("Invalid reply line: {line}")))?;

    match line.as_bytes().get(3) {
        None | Some(b' ' | b'-') => {}
        Some(_) => {
            return Err(ProtocolError::Malformed(format!(
                "Invalid reply separator: {line}"
            )));
        }
    }

    code.parse()
        .map_err(|_| ProtocolError::Malformed(format!("Invalid reply code: {code}")))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Continuation lines use `-` after the code; the last line uses a space or
/// ends right after the code.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}
