//! Typed view of one LXD API response.
//!
//! # Design
//! An `Envelope` is built once per HTTP round trip and never mutated. Its
//! classification is computed eagerly from fixed status-code sets, so a
//! status code outside both sets stays visibly unresolved instead of
//! defaulting to success. The response `type` is kept as read; a value other
//! than `sync`/`async`/`error` is preserved in [`ResponseType::Other`] for
//! the dispatcher to report.
//!
//! `metadata` is opaque here. Resource methods decode it lazily with
//! [`Envelope::metadata_as`] or [`Envelope::operation`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::types::Operation;

/// HTTP statuses that mark a successful envelope.
pub const SUCCESS_STATUS_CODES: [u16; 3] = [200, 201, 202];

/// HTTP statuses (and operation status codes) that mark a failure.
pub const ERROR_STATUS_CODES: [u16; 7] = [400, 401, 403, 404, 409, 412, 500];

/// Classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Error,
    /// Neither a success nor an error code.
    Unrecognized,
}

impl StatusClass {
    pub fn of(code: u16) -> Self {
        if SUCCESS_STATUS_CODES.contains(&code) {
            StatusClass::Success
        } else if ERROR_STATUS_CODES.contains(&code) {
            StatusClass::Error
        } else {
            StatusClass::Unrecognized
        }
    }
}

/// The envelope `type` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseType {
    Sync,
    Async,
    Error,
    /// Anything else, including a missing `type`.
    Other(String),
}

impl ResponseType {
    pub fn parse(value: &str) -> Self {
        match value {
            "sync" => ResponseType::Sync,
            "async" => ResponseType::Async,
            "error" => ResponseType::Error,
            other => ResponseType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResponseType::Sync => "sync",
            ResponseType::Async => "async",
            ResponseType::Error => "error",
            ResponseType::Other(value) => value,
        }
    }
}

/// Body read back when the response carries no `metadata`.
static NULL: Value = Value::Null;

/// One API response: HTTP status plus the JSON body exactly as received.
///
/// Envelope fields (`type`, `status`, `error_code`, ...) are read through
/// accessors, so a body with unexpected or extra fields still parses and
/// reads back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    status_code: u16,
    body: Value,
    class: StatusClass,
    kind: ResponseType,
}

impl Envelope {
    pub fn new(status_code: u16, body: Value) -> Self {
        let kind = ResponseType::parse(body.get("type").and_then(Value::as_str).unwrap_or_default());
        Self {
            status_code,
            class: StatusClass::of(status_code),
            kind,
            body,
        }
    }

    /// Parse a raw body. Malformed JSON is an [`Error::Parse`].
    pub fn parse(status_code: u16, raw_body: &[u8]) -> Result<Self> {
        let body: Value = serde_json::from_slice(raw_body).map_err(|source| Error::Parse {
            status: status_code,
            source,
        })?;
        Ok(Self::new(status_code, body))
    }

    pub fn from_response(response: &HttpResponse) -> Result<Self> {
        Self::parse(response.status, response.body.as_bytes())
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The body as received.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    pub fn class(&self) -> StatusClass {
        self.class
    }

    pub fn is_success(&self) -> bool {
        self.class == StatusClass::Success
    }

    pub fn is_error(&self) -> bool {
        self.class == StatusClass::Error
    }

    pub fn response_type(&self) -> &ResponseType {
        &self.kind
    }

    pub fn is_sync(&self) -> bool {
        self.kind == ResponseType::Sync
    }

    pub fn is_async(&self) -> bool {
        self.kind == ResponseType::Async
    }

    /// Body `status` text, e.g. `Success`.
    pub fn status(&self) -> Option<&str> {
        self.body.get("status").and_then(Value::as_str)
    }

    /// Body `status_code`, distinct from the HTTP status.
    pub fn body_status_code(&self) -> Option<i64> {
        self.body.get("status_code").and_then(as_integer)
    }

    /// Top-level `operation` URL of an async response.
    pub fn operation_url(&self) -> Option<&str> {
        self.body.get("operation").and_then(Value::as_str)
    }

    /// `metadata`, or `null` when absent.
    pub fn metadata(&self) -> &Value {
        self.body.get("metadata").unwrap_or(&NULL)
    }

    pub fn into_metadata(self) -> Value {
        match self.body {
            Value::Object(mut fields) => fields.remove("metadata").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    pub fn error_code(&self) -> Option<i64> {
        self.body.get("error_code").and_then(as_integer)
    }

    /// Decode `metadata` into `T`.
    pub fn metadata_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.metadata().clone())
            .map_err(|e| Error::UnexpectedMetadata(e.to_string()))
    }

    /// Id of the operation this envelope refers to.
    ///
    /// Reads `metadata.id`, falling back to the last segment of the
    /// top-level `operation` URL.
    pub fn operation_id(&self) -> Option<String> {
        if let Some(id) = self.metadata().get("id").and_then(Value::as_str) {
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        self.operation_url()
            .map(trailing_segment)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Decode `metadata` as an operation record.
    pub fn operation(&self) -> Result<Operation> {
        self.metadata_as()
    }

    /// The operation's own status code, `metadata.status_code`.
    pub fn operation_status_code(&self) -> Option<i64> {
        self.metadata().get("status_code").and_then(as_integer)
    }

    /// Whether `metadata.status_code` is in the error set.
    pub fn operation_failed(&self) -> bool {
        self.operation_status_code()
            .and_then(|code| u16::try_from(code).ok())
            .is_some_and(|code| StatusClass::of(code) == StatusClass::Error)
    }
}

/// Integer value of a JSON number, accepting integral floats like `200.0`.
pub(crate) fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Last non-empty segment of an absolute resource path.
///
/// `/1.0/containers/web?project=x` becomes `web`.
pub fn trailing_segment(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}
