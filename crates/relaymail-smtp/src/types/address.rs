//! Envelope address type.

use crate::error::{Error, Result};

/// Address used in `MAIL FROM` / `RCPT TO`.
///
/// The only check is the RFC 5321 line rule: an address must not contain CR
/// or LF, since either would let the caller smuggle extra commands onto the
/// wire. Syntax beyond that is left to the server; an empty address is the
/// null reverse-path (`MAIL FROM:<>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates an address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address contains `\r` or `\n`.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        if addr.contains(['\r', '\n']) {
            return Err(Error::InvalidAddress(addr));
        }
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn accepts_null_reverse_path() {
        assert_eq!(Address::new("").unwrap().as_str(), "");
    }

    #[test]
    fn rejects_line_breaks() {
        for bad in ["a@b.c\r\nRCPT TO:<x@y.z>", "a@b.c\n", "\ra@b.c"] {
            let err = Address::new(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidAddress(ref s) if s == bad));
        }
    }

    proptest! {
        #[test]
        fn any_cr_or_lf_is_rejected(prefix in "[ -~]{0,20}", brk in "[\r\n]", suffix in "[ -~]{0,20}") {
            let candidate = format!("{prefix}{brk}{suffix}");
            prop_assert!(Address::new(candidate).is_err());
        }

        #[test]
        fn printable_ascii_is_accepted(addr in "[ -~]{0,40}") {
            prop_assert!(Address::new(addr).is_ok());
        }
    }
}
