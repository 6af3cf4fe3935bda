//! Counter keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest key accepted, in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// Opaque identifier of one counter.
///
/// A key addresses exactly one actor instance at a time. Beyond a few
/// addressing rules it is never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CounterKey(String);

impl CounterKey {
    /// Validate and wrap a key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidKey` if the key is empty, longer than
    /// [`MAX_KEY_LEN`] bytes, or contains `/` or control characters.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::invalid_key(key, "key is empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(Error::invalid_key(
                key,
                format!("key exceeds {MAX_KEY_LEN} bytes"),
            ));
        }
        if key.contains('/') {
            return Err(Error::invalid_key(key, "key contains '/'"));
        }
        if key.chars().any(char::is_control) {
            return Err(Error::invalid_key(key, "key contains control characters"));
        }
        Ok(Self(key))
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CounterKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CounterKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CounterKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CounterKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CounterKey> for String {
    fn from(key: CounterKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_key() {
        let key = CounterKey::new("room1");
        assert!(key.is_ok());
        if let Ok(k) = key {
            assert_eq!(k.as_str(), "room1");
            assert_eq!(k.to_string(), "room1");
        }
    }

    #[test]
    fn test_accepts_unicode_and_spaces() {
        assert!(CounterKey::new("salle à manger").is_ok());
        assert!(CounterKey::new("🔥").is_ok());
    }

    #[test]
    fn test_rejects_empty_key() {
        assert!(matches!(
            CounterKey::new(""),
            Err(Error::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_rejects_slash_and_control_chars() {
        assert!(CounterKey::new("a/b").is_err());
        assert!(CounterKey::new("a\nb").is_err());
    }

    #[test]
    fn test_rejects_oversized_key() {
        let long = "k".repeat(MAX_KEY_LEN + 1);
        assert!(CounterKey::new(long).is_err());
        let exact = "k".repeat(MAX_KEY_LEN);
        assert!(CounterKey::new(exact).is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: std::result::Result<CounterKey, _> = serde_json::from_str(r#""room1""#);
        assert!(ok.is_ok());
        let bad: std::result::Result<CounterKey, _> = serde_json::from_str(r#""""#);
        assert!(bad.is_err());
    }
}
