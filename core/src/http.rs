//! HTTP request and response types exchanged with a [`Transport`].
//!
//! # Design
//! Requests and responses are plain data. Resource methods build
//! `HttpRequest` values, a transport turns them into bytes on a Unix socket
//! or a TCP/TLS connection, and hands back an `HttpResponse` for the
//! dispatcher to classify. Keeping the wire step behind data makes the
//! dispatch logic testable without a server.
//!
//! `path` is always the request target relative to the server root
//! (`/1.0/containers`), never a full URL. The transport owns addressing.
//!
//! [`Transport`]: crate::transport::Transport

use serde::Serialize;
use url::Url;

use crate::config::API_PREFIX;
use crate::error::{Error, Result};

pub const ACCEPT: &str = "accept";
pub const CONTENT_TYPE: &str = "content-type";
pub const APPLICATION_JSON: &str = "application/json";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// A body-less request that accepts JSON.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: vec![(ACCEPT.to_string(), APPLICATION_JSON.to_string())],
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// A request carrying `body` serialized as a JSON document.
    pub fn json<T: Serialize + ?Sized>(
        method: HttpMethod,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        let body = serde_json::to_string(body).map_err(Error::Serialization)?;
        let mut request = Self::new(method, path);
        request
            .headers
            .push((CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string()));
        request.body = Some(body);
        Ok(request)
    }

    /// Append a query parameter to the request path.
    ///
    /// Values are expected to be URL-safe already (identifiers, integers).
    pub fn with_query(mut self, key: &str, value: impl std::fmt::Display) -> Self {
        let separator = if self.path.contains('?') { '&' } else { '?' };
        self.path = format!("{}{separator}{key}={value}", self.path);
        self
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Request target for an API endpoint built from path segments.
///
/// Each segment is percent-encoded, so a resource name holding `/`, `?`,
/// `#` or spaces stays one segment. `api_path(&["containers", "web"])` is
/// `/1.0/containers/web`.
pub fn api_path(segments: &[&str]) -> String {
    let verbatim = || format!("{API_PREFIX}/{}", segments.join("/"));

    // Only used for its path encoder; the host never leaves this function.
    let Ok(mut url) = Url::parse(&format!("http://lxd{API_PREFIX}")) else {
        return verbatim();
    };
    match url.path_segments_mut() {
        Ok(mut path) => {
            path.extend(segments);
        }
        Err(()) => return verbatim(),
    }
    url.path().to_string()
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_accepts_json_without_body() {
        let req = HttpRequest::get("/1.0/containers");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.header("Accept"), Some(APPLICATION_JSON));
        assert!(req.header("content-type").is_none());
        assert!(req.body.is_none());
    }

    #[test]
    fn json_sets_content_type_and_serializes_body() {
        let req = HttpRequest::json(
            HttpMethod::Put,
            "/1.0/profiles/default",
            &serde_json::json!({ "description": "x" }),
        )
        .unwrap();
        assert_eq!(req.header("accept"), Some(APPLICATION_JSON));
        assert_eq!(req.header("Content-Type"), Some(APPLICATION_JSON));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["description"], "x");
    }

    #[test]
    fn with_query_picks_separator() {
        let req = HttpRequest::get("/1.0/operations/abc/wait").with_query("timeout", 30);
        assert_eq!(req.path, "/1.0/operations/abc/wait?timeout=30");
        let req = req.with_query("project", "default");
        assert_eq!(req.path, "/1.0/operations/abc/wait?timeout=30&project=default");
    }

    #[test]
    fn api_path_joins_segments_under_prefix() {
        assert_eq!(api_path(&["containers"]), "/1.0/containers");
        assert_eq!(
            api_path(&["containers", "web", "snapshots", "snap0"]),
            "/1.0/containers/web/snapshots/snap0"
        );
    }

    #[test]
    fn api_path_encodes_reserved_characters() {
        assert_eq!(api_path(&["profiles", "my profile"]), "/1.0/profiles/my%20profile");
        assert_eq!(api_path(&["containers", "a?b#c"]), "/1.0/containers/a%3Fb%23c");
        assert_eq!(api_path(&["containers", "a/b"]), "/1.0/containers/a%2Fb");
    }

    #[test]
    fn method_renders_upper_case() {
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::Delete.as_str(), "DELETE");
    }
}
