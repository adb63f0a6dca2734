//! Typed error hierarchy for the intune-graph crate.
//!
//! Every variant maps to a real boundary: the token endpoint (`Auth`), the
//! Graph REST API (`Api`), response interpretation (`MissingId`,
//! `UnexpectedResponse`, `Parse`), the local device store (`Store`,
//! `Database`), local files (`Io`), configuration loading (`Config`), and the
//! network itself (`Network`).
//!
//! "No usable response" is deliberately *not* an error: operations that can
//! come back empty return `Ok(None)` and leave the decision to the caller.

use reqwest::StatusCode;

/// Unified error type for all intune-graph library operations.
#[derive(Debug, thiserror::Error)]
pub enum IntuneError {
    /// Authentication failure.
    ///
    /// Raised when a request is attempted with no bearer token installed,
    /// when the token endpoint cannot be reached, or when a session could
    /// not be established before a call that requires one.
    #[error("authentication failed: {message}")]
    Auth {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying transport or parse error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Graph returned a non-success HTTP status code.
    ///
    /// The response body is kept verbatim; Graph error bodies carry the
    /// `error.code` / `error.message` pair needed to diagnose permission
    /// and request-shape problems.
    #[error("API error {status}: {body}")]
    Api {
        /// The HTTP status code returned by Graph.
        status: StatusCode,
        /// The raw response body text.
        body: String,
    },

    /// A create call returned a body without a top-level `id` field.
    #[error("response for {resource} did not contain an id")]
    MissingId {
        /// The kind of resource that was being created.
        resource: &'static str,
    },

    /// A caller-supplied argument cannot be sent to Graph (e.g. an empty id).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The response parsed as JSON but did not have the expected shape.
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),

    /// The device store rejected an operation.
    #[error("device store error: {message}")]
    Store {
        /// Description of the store failure.
        message: String,
    },

    /// The SQLite device store failed.
    #[error("device database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration could not be loaded or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Local file I/O failed (script files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Transport-level failure (DNS, TCP, TLS, timeout). No status code is
    /// available because the request did not complete.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl IntuneError {
    /// Shorthand for an [`IntuneError::Auth`] without an underlying cause.
    pub fn auth(message: impl Into<String>) -> Self {
        IntuneError::Auth {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an [`IntuneError::Store`].
    pub fn store(message: impl Into<String>) -> Self {
        IntuneError::Store {
            message: message.into(),
        }
    }
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, IntuneError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn auth_error_displays_message() {
        let err = IntuneError::auth("no access token installed");
        let msg = err.to_string();
        assert!(msg.contains("authentication failed"));
        assert!(msg.contains("no access token installed"));
        assert!(err.source().is_none());
    }

    #[test]
    fn auth_error_with_source_chains_correctly() {
        let json_err: serde_json::Error = serde_json::from_str::<String>("not-json").unwrap_err();
        let err = IntuneError::Auth {
            message: "failed to parse token response".to_string(),
            source: Some(Box::new(json_err)),
        };
        assert!(
            err.source().is_some(),
            "Auth error with source should have a chained cause"
        );
    }

    #[test]
    fn api_error_preserves_status_and_body() {
        let err = IntuneError::Api {
            status: StatusCode::FORBIDDEN,
            body: r#"{"error":{"code":"Forbidden","message":"Insufficient privileges"}}"#
                .to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("Insufficient privileges"));
    }

    #[test]
    fn missing_id_names_the_resource() {
        let err = IntuneError::MissingId {
            resource: "assignment filter",
        };
        assert_eq!(
            err.to_string(),
            "response for assignment filter did not contain an id"
        );
    }

    #[test]
    fn parse_error_wraps_serde_json() {
        let json_err: serde_json::Error =
            serde_json::from_str::<String>("{{bad json}}").unwrap_err();
        let err = IntuneError::from(json_err);
        assert!(err.to_string().contains("failed to parse response"));
        assert!(err.source().is_some());
    }

    #[test]
    fn io_error_converts_with_question_mark() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/definitely/not/here.json")?)
        }
        assert!(matches!(read_missing(), Err(IntuneError::Io(_))));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IntuneError>();
    }
}
