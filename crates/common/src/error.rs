//! Error types for Realmgate

use crate::types::Operator;
use thiserror::Error;

/// Result type alias using Realmgate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Realmgate error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("backend configuration error: name is empty")]
    NameEmpty,

    #[error("backend configuration error: method is empty")]
    MethodEmpty,

    #[error("backend configuration error: realm is empty")]
    RealmEmpty,

    #[error("backend configuration error: path is empty")]
    PathEmpty,

    #[error("backend configuration error: realm {realm} path mismatch: {path} vs. {existing}")]
    PathMismatch {
        realm: String,
        path: String,
        existing: String,
    },

    #[error("authenticator configuration error: portal name is empty")]
    PortalNameEmpty,

    #[error("authenticator configuration error: path is empty")]
    EndpointPathEmpty,

    #[error("portal not found: {name}")]
    PortalNotFound { name: String },

    #[error("portal {portal} already has an authenticator at {path}")]
    EndpointPathTaken { portal: String, path: String },

    #[error("operator not supported: {op}")]
    OperatorNotSupported { op: Operator },

    #[error("backend unavailable for realm {realm}")]
    BackendUnavailable { realm: String },

    #[error("portal unavailable: {portal}")]
    PortalUnavailable { portal: String },

    #[error("{op} request is missing {field}")]
    MissingField { op: Operator, field: &'static str },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("authentication failed")]
    AuthFailed {
        backend: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Resource already exists: {kind} with id {id}")]
    AlreadyExists { kind: String, id: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    pub fn already_exists(kind: &str, id: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    /// Not-found results are benign: callers deleting or looking up absent
    /// material may ignore them.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for errors detected while configuring a backend or endpoint.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::NameEmpty
                | Error::MethodEmpty
                | Error::RealmEmpty
                | Error::PathEmpty
                | Error::PathMismatch { .. }
                | Error::PortalNameEmpty
                | Error::EndpointPathEmpty
                | Error::PortalNotFound { .. }
                | Error::EndpointPathTaken { .. }
        )
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(e: argon2::password_hash::Error) -> Self {
        Error::Crypto(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_auth_failed_hides_cause_in_display() {
        let err = Error::AuthFailed {
            backend: "db1".to_string(),
            source: Box::new(Error::InvalidCredentials),
        };
        assert_eq!(err.to_string(), "authentication failed");
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "invalid credentials");
    }

    #[test]
    fn test_path_mismatch_names_both_paths() {
        let err = Error::PathMismatch {
            realm: "default".to_string(),
            path: "/tmp/b.db".to_string(),
            existing: "/tmp/a.db".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/a.db"));
        assert!(msg.contains("/tmp/b.db"));
        assert!(err.is_config());
    }

    #[test]
    fn test_not_found_is_benign() {
        assert!(Error::not_found("public key", "abc").is_not_found());
        assert!(!Error::InvalidCredentials.is_not_found());
    }
}
