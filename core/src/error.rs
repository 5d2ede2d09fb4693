//! Error types for the LXD client.
//!
//! # Design
//! Every failure a call can produce is one variant of [`Error`]. Nothing is
//! retried inside the crate: transport failures, malformed bodies, protocol
//! violations and API-level failures all surface to the immediate caller.
//!
//! API-level failures come from two layers. An error HTTP status on the
//! initial exchange and a failed operation reported after an asynchronous
//! wait both land in [`ClientError`], so callers handle them the same way.
//! The rendered message of a `ClientError` is stable; existing callers match
//! on its text.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::envelope::Envelope;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the dispatcher and resource methods.
#[derive(Debug, Error)]
pub enum Error {
    /// No HTTP exchange took place (connect failure, timeout, broken stream).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body was not valid JSON.
    #[error("malformed response body (HTTP {status}): {source}")]
    Parse {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    /// A successful envelope whose `type` is neither `sync` nor `async`.
    #[error("Unknown response type {response_type}")]
    UnknownResponseType {
        response_type: String,
        envelope: Box<Envelope>,
    },

    /// The server reported failure, either directly or through an operation.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// HTTP status outside both the success and the error sets.
    #[error("unrecognized HTTP status {}", .0.status_code())]
    UnrecognizedStatus(Box<Envelope>),

    /// An asynchronous envelope without an operation id to wait on.
    #[error("asynchronous response carries no operation id")]
    MissingOperationId(Box<Envelope>),

    /// Envelope metadata did not have the shape the caller asked for.
    #[error("unexpected metadata: {0}")]
    UnexpectedMetadata(String),

    /// The request payload could not be serialized to JSON.
    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The envelope that caused this error, when one was received.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            Error::Client(err) => Some(err.envelope()),
            Error::UnknownResponseType { envelope, .. } => Some(&**envelope),
            Error::UnrecognizedStatus(envelope) | Error::MissingOperationId(envelope) => {
                Some(&**envelope)
            }
            _ => None,
        }
    }
}

/// Which layer of the protocol reported the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Error HTTP status on the exchange itself.
    Response,
    /// The exchange succeeded but the waited-on operation failed.
    Operation,
}

/// Failure reported by the server, carrying the envelope that reported it.
#[derive(Debug, Clone, Error)]
#[error("Received response with error_code {code} : '{message}'")]
pub struct ClientError {
    envelope: Envelope,
    origin: ErrorOrigin,
    code: i64,
    message: String,
}

impl ClientError {
    /// Build from an envelope whose HTTP status is in the error set.
    ///
    /// Reads `error_code` and `error` from the body. A missing code falls
    /// back to the HTTP status, a missing or empty message to `status`.
    pub fn from_response(envelope: Envelope) -> Self {
        let code = envelope
            .error_code()
            .unwrap_or_else(|| i64::from(envelope.status_code()));
        let message = non_empty(envelope.error())
            .or_else(|| non_empty(envelope.status()))
            .unwrap_or_default()
            .to_string();
        Self {
            envelope,
            origin: ErrorOrigin::Response,
            code,
            message,
        }
    }

    /// Build from a terminal operation envelope whose `metadata.status_code`
    /// marks failure.
    ///
    /// Reads the operation's own `status_code` and `err`, falling back to the
    /// outer body's `error_code`/`error` and then the operation `status`.
    pub fn from_operation(envelope: Envelope) -> Self {
        let metadata = envelope.metadata();
        let code = envelope
            .operation_status_code()
            .or(envelope.error_code())
            .unwrap_or_else(|| i64::from(envelope.status_code()));
        let message = non_empty(metadata.get("err").and_then(serde_json::Value::as_str))
            .or_else(|| non_empty(envelope.error()))
            .or_else(|| non_empty(metadata.get("status").and_then(serde_json::Value::as_str)))
            .unwrap_or_default()
            .to_string();
        Self {
            envelope,
            origin: ErrorOrigin::Operation,
            code,
            message,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> Envelope {
        self.envelope
    }

    pub fn origin(&self) -> ErrorOrigin {
        self.origin
    }

    pub fn error_code(&self) -> i64 {
        self.code
    }

    pub fn error_message(&self) -> &str {
        &self.message
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

/// Failures that happen before or during the raw HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("no response from {address} within {timeout:?}")]
    ReadTimeout { address: String, timeout: Duration },

    /// The connection was established but the HTTP exchange broke.
    #[error("HTTP exchange with {address} failed: {message}")]
    Exchange { address: String, message: String },

    /// The blocking task running the exchange panicked or was cancelled.
    #[error("transport task failed: {0}")]
    Task(String),
}

/// Invalid client configuration, detected before any network I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("cannot read {}: {source}", .path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM in {}: {reason}", .path.display())]
    InvalidPem { path: PathBuf, reason: String },

    #[error("client certificate and key must be configured together")]
    IncompleteIdentity,

    #[error("a client certificate requires an https address, got {0}")]
    TlsNotApplicable(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(status: u16, body: &str) -> Envelope {
        Envelope::parse(status, body.as_bytes()).unwrap()
    }

    #[test]
    fn renders_not_found_message() {
        let err = ClientError::from_response(envelope(
            404,
            r#"{"error":"not found","error_code":404,"type":"error"}"#,
        ));
        assert_eq!(
            err.to_string(),
            "Received response with error_code 404 : 'not found'"
        );
        assert_eq!(err.origin(), ErrorOrigin::Response);
        assert_eq!(err.envelope().status_code(), 404);
    }

    #[test]
    fn keeps_quotes_inside_message() {
        let err = ClientError::from_response(envelope(
            500,
            r#"{"error":"Failed to retrieve profile='nonexistent_profile'","error_code":500,"type":"error"}"#,
        ));
        assert_eq!(
            err.to_string(),
            "Received response with error_code 500 : 'Failed to retrieve profile='nonexistent_profile''"
        );
    }

    #[test]
    fn falls_back_to_http_status_when_body_is_sparse() {
        let err = ClientError::from_response(envelope(403, r#"{"type":"error"}"#));
        assert_eq!(err.error_code(), 403);
        assert_eq!(err.to_string(), "Received response with error_code 403 : ''");
    }

    #[test]
    fn operation_failure_reads_operation_fields() {
        let err = ClientError::from_operation(envelope(
            200,
            r#"{"type":"sync","status":"Success","status_code":200,"error_code":0,"error":"",
                "metadata":{"id":"op-1","status":"Failure","status_code":400,"err":"container is not running"}}"#,
        ));
        assert_eq!(err.origin(), ErrorOrigin::Operation);
        assert_eq!(err.error_code(), 400);
        assert_eq!(
            err.to_string(),
            "Received response with error_code 400 : 'container is not running'"
        );
    }

    #[test]
    fn operation_failure_without_err_uses_status() {
        let err = ClientError::from_operation(envelope(
            200,
            r#"{"type":"sync","metadata":{"status":"Failure","status_code":500}}"#,
        ));
        assert_eq!(err.error_message(), "Failure");
    }

    #[test]
    fn error_exposes_envelope() {
        let env = envelope(404, r#"{"error":"not found","error_code":404,"type":"error"}"#);
        let err: Error = ClientError::from_response(env.clone()).into();
        assert_eq!(err.envelope(), Some(&env));

        let err = Error::UnexpectedMetadata("x".into());
        assert!(err.envelope().is_none());
    }
}
