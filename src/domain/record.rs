//! Record identifiers, detail payloads and the bearer credential.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Detail payload returned by the portal for one record.
///
/// The engine never looks inside it.
pub type DetailPayload = serde_json::Value;

/// Opaque key of one remote document, as returned by a list call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Bearer token for the portal session.
///
/// `Debug` and `Display` never print the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***{} chars)", self.0.len())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Bearer ***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_is_redacted() {
        let credential = Credential::bearer("secret-token-value");
        assert!(!format!("{credential:?}").contains("secret"));
        assert!(!credential.to_string().contains("secret"));
        assert_eq!(credential.authorization_header(), "Bearer secret-token-value");
    }

    #[test]
    fn record_id_serializes_as_plain_string() {
        let id = RecordId::new("12345");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"12345\"");

        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
