//! Channels that carry one HTTP exchange to the API.
//!
//! [`select`] picks the channel from the configured [`Address`]: a Unix
//! domain socket, or HTTP(S) over TCP. Every [`Transport::send`] opens its
//! own connection, so one transport can be shared by concurrent callers
//! without locking.

use std::sync::Arc;

use crate::config::{Address, ClientConfig};
use crate::error::{ConfigError, TransportError};
use crate::http::{HttpRequest, HttpResponse};

pub mod http;
pub mod unix;

pub use self::http::HttpTransport;
pub use self::unix::UnixTransport;

/// Sends one request and returns the raw response.
///
/// Any HTTP status is a successful exchange; classifying it is the
/// dispatcher's job.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Human-readable target, used in logs and errors.
    fn address(&self) -> String;
}

/// Build the transport for `config.address`.
///
/// TLS material is loaded here, so a missing certificate or key fails before
/// any network I/O.
pub fn select(config: &ClientConfig) -> Result<Arc<dyn Transport>, ConfigError> {
    config.validate()?;
    let transport: Arc<dyn Transport> = match &config.address {
        Address::Unix(path) => Arc::new(UnixTransport::new(
            path,
            config.open_timeout,
            config.read_timeout,
        )),
        Address::Http(url) => Arc::new(HttpTransport::new(url, config)?),
    };
    tracing::debug!(address = %transport.address(), "Selected transport");
    Ok(transport)
}
