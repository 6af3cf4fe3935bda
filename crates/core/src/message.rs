//! Messages streamed to watching clients.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Messages pushed from a counter to its streaming connections.
///
/// Encoded as UTF-8 JSON text frames, e.g. `{"type":"update","count":2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
    /// Current value of the counter.
    Update { count: i64 },
}

impl UpdateMessage {
    /// Update carrying `count`.
    #[must_use]
    pub const fn update(count: i64) -> Self {
        Self::Update { count }
    }

    /// Count carried by the message.
    #[must_use]
    pub const fn count(&self) -> i64 {
        match self {
            Self::Update { count } => *count,
        }
    }

    /// Encode as a JSON text frame payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Decode a JSON text frame payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the payload is not an update message.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_wire_format() {
        let json = UpdateMessage::update(2).to_json();
        assert_eq!(json, Ok(r#"{"type":"update","count":2}"#.to_string()));
    }

    #[test]
    fn test_negative_counts_encode() {
        let json = UpdateMessage::update(-3).to_json();
        assert_eq!(json, Ok(r#"{"type":"update","count":-3}"#.to_string()));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let msg = UpdateMessage::from_json(r#"{"type":"reset"}"#);
        assert!(matches!(msg, Err(Error::Serialization { .. })));
    }
}
