use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper::client::conn;
use hyper::header::HOST;
use hyper::{Body, Method, Request};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::config::{DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// `Host` sent over the socket. The daemon ignores it; HTTP/1.1 requires one.
pub const UNIX_HOST_PLACEHOLDER: &str = "lxd";

/// HTTP/1.1 over a Unix domain socket.
///
/// Opens a fresh connection per request. The connect step is bounded by
/// `open_timeout`, the request/response exchange by `read_timeout`.
#[derive(Debug, Clone)]
pub struct UnixTransport {
    path: PathBuf,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl UnixTransport {
    pub fn new(path: impl AsRef<Path>, open_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            open_timeout,
            read_timeout,
        }
    }

    /// Transport with the default timeouts.
    pub fn with_defaults(path: impl AsRef<Path>) -> Self {
        Self::new(path, DEFAULT_OPEN_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<UnixStream, TransportError> {
        timeout(self.open_timeout, UnixStream::connect(&self.path))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                address: self.address(),
                timeout: self.open_timeout,
            })?
            .map_err(|source| TransportError::Connect {
                address: self.address(),
                source,
            })
    }
}

#[async_trait::async_trait]
impl Transport for UnixTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let stream = self.connect().await?;
        tracing::trace!(path = %self.path.display(), "Unix socket connected");

        let exchange = async move {
            let (mut sender, connection) = conn::handshake(stream)
                .await
                .map_err(|e| e.to_string())?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::debug!(error = %e, "Unix socket connection closed with error");
                }
            });

            let request = to_hyper(request).map_err(|e| e.to_string())?;
            let response = sender
                .send_request(request)
                .await
                .map_err(|e| e.to_string())?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = hyper::body::to_bytes(response.into_body())
                .await
                .map_err(|e| e.to_string())?;

            Ok::<_, String>(HttpResponse {
                status,
                headers,
                body: decode_body(body.to_vec())?,
            })
        };

        timeout(self.read_timeout, exchange)
            .await
            .map_err(|_| TransportError::ReadTimeout {
                address: self.address(),
                timeout: self.read_timeout,
            })?
            .map_err(|message| TransportError::Exchange {
                address: self.address(),
                message,
            })
    }

    fn address(&self) -> String {
        format!("unix://{}", self.path.display())
    }
}

fn decode_body(bytes: Vec<u8>) -> Result<String, String> {
    String::from_utf8(bytes).map_err(|e| format!("response body is not valid UTF-8: {e}"))
}

fn to_hyper(request: HttpRequest) -> Result<Request<Body>, hyper::http::Error> {
    let method = match request.method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    };

    let mut builder = Request::builder()
        .method(method)
        .uri(request.path.as_str())
        .header(HOST, UNIX_HOST_PLACEHOLDER);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let body = request.body.map(Body::from).unwrap_or_else(Body::empty);
    builder.body(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyper_request_uses_placeholder_host_and_relative_target() {
        let request = HttpRequest::json(
            HttpMethod::Put,
            "/1.0/containers/web/state",
            &serde_json::json!({ "action": "stop" }),
        )
        .unwrap();
        let hyper_request = to_hyper(request).unwrap();

        assert_eq!(*hyper_request.method(), Method::PUT);
        assert_eq!(hyper_request.uri(), "/1.0/containers/web/state");
        assert_eq!(hyper_request.headers()[HOST], UNIX_HOST_PLACEHOLDER);
        assert_eq!(hyper_request.headers()["content-type"], "application/json");
    }

    #[test]
    fn invalid_utf8_body_is_rejected() {
        assert_eq!(decode_body(br#"{"type":"sync"}"#.to_vec()).unwrap(), r#"{"type":"sync"}"#);
        let err = decode_body(vec![b'{', 0xff, 0xfe, b'}']).unwrap_err();
        assert!(err.contains("not valid UTF-8"), "{err}");
    }

    #[tokio::test]
    async fn missing_socket_is_a_connect_error() {
        let transport = UnixTransport::with_defaults("/nonexistent/lxd-client-test.sock");
        let err = transport
            .send(HttpRequest::get("/1.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "{err}");
    }
}
