//! # Error Taxonomy
//!
//! Purpose: One error type shared by every layer, so the store boundary, the
//! controller and the client facade report failures the same way.
//!
//! ## Design Principles
//! 1. **Typed Failures**: Each variant names the layer that rejected the call.
//! 2. **Fail Fast**: Schema, key and value errors are raised before any I/O.
//! 3. **Retry Awareness**: Only connection failures are considered transient.

use thiserror::Error;

/// Result alias used across the workspace.
pub type RkvResult<T> = Result<T, RkvError>;

/// Errors surfaced by the access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RkvError {
    /// Network failure, missing primary, or empty replica pool.
    #[error("connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// Credentials rejected by the store. Never retried.
    #[error("authentication failed ({endpoint}): {message}")]
    Authentication { endpoint: String, message: String },

    /// Missing or invalid schema declaration.
    #[error("schema error: {0}")]
    Schema(String),

    /// Dynamic key values do not fit the declared schema.
    #[error("key error: {0}")]
    Key(String),

    /// Payload could not be encoded or decoded.
    #[error("value error: {0}")]
    Value(String),

    /// Malformed reply framing or an unexpected reply type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Error reply returned by the store.
    #[error("server error: {0}")]
    Server(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl RkvError {
    /// Builds a connection error for `endpoint`.
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        RkvError::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Builds an authentication error for `endpoint`.
    pub fn authentication(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        RkvError::Authentication {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns true when retrying the same call may succeed.
    ///
    /// Only used at connect time; call-time failures are surfaced as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, RkvError::Connection { .. })
    }
}

impl From<serde_json::Error> for RkvError {
    fn from(err: serde_json::Error) -> Self {
        RkvError::Value(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_errors_are_transient() {
        assert!(RkvError::connection("r1", "refused").is_transient());
        assert!(!RkvError::authentication("r1", "WRONGPASS").is_transient());
        assert!(!RkvError::Key("bad".into()).is_transient());
        assert!(!RkvError::Protocol("eof".into()).is_transient());
    }

    #[test]
    fn display_names_endpoint() {
        let err = RkvError::connection("10.0.0.1:6380", "no replica connections available");
        assert_eq!(
            err.to_string(),
            "connection error (10.0.0.1:6380): no replica connections available"
        );
    }
}
