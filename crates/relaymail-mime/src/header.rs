//! Ordered header blocks.

/// An ordered block of header fields.
///
/// Fields are written in insertion order with their names as given, each
/// terminated by CRLF regardless of the host platform. [`Headers::get`] and
/// [`Headers::iter`] let callers inspect the block returned by
/// [`Message::headers`](crate::Message::headers) without serializing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Gets the first value for a header (case-insensitive name match).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Appends the wire form of every field to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.fields {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_case() {
        let mut headers = Headers::new();
        headers.add("Subject", "hi").add("From", "a@b.c").add("MIME-Version", "1.0");

        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Subject", "From", "MIME-Version"]);
    }

    #[test]
    fn get_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("To"), None);
    }

    #[test]
    fn writes_crlf_lines() {
        let mut headers = Headers::new();
        headers.add("From", "a@b.c").add("To", "d@e.f");

        let mut out = Vec::new();
        headers.write_to(&mut out);
        assert_eq!(out, b"From: a@b.c\r\nTo: d@e.f\r\n");
    }

    #[test]
    fn empty_block_writes_nothing() {
        let headers = Headers::new();
        let mut out = Vec::new();
        headers.write_to(&mut out);
        assert!(out.is_empty());
        assert_eq!(headers.iter().count(), 0);
    }
}
