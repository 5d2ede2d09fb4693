use std::io;
use std::path::Path;
use std::time::Duration;

use ureq::tls::{Certificate, ClientCert, PrivateKey, TlsConfig};
use ureq::typestate::WithBody;
use ureq::{Agent, RequestBuilder};

use crate::config::ClientConfig;
use crate::error::{ConfigError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::transport::Transport;

/// HTTP or HTTPS over TCP, optionally with a client certificate.
///
/// The blocking `ureq` agent runs on tokio's blocking pool. Status codes
/// are returned as data, never as errors.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    agent: Agent,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport for `base_url`, loading the client identity from
    /// `config` when one is configured.
    pub fn new(base_url: &str, config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut tls = TlsConfig::builder().disable_verification(!config.verify_tls);
        if !config.verify_tls {
            tracing::warn!(address = %base_url, "TLS server verification disabled");
        }
        if let (Some(cert), Some(key)) = (&config.client_cert, &config.client_key) {
            tls = tls.client_cert(Some(load_identity(cert, key)?));
            tracing::debug!(cert = %cert.display(), "Loaded client certificate");
        }

        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(config.open_timeout))
            .timeout_recv_response(Some(config.read_timeout))
            .timeout_recv_body(Some(config.read_timeout))
            .tls_config(tls.build())
            .build()
            .new_agent();

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            open_timeout: config.open_timeout,
            read_timeout: config.read_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(&self, err: ureq::Error) -> TransportError {
        let address = self.base_url.clone();
        match err {
            ureq::Error::Timeout(ureq::Timeout::Connect | ureq::Timeout::Resolve) => {
                TransportError::ConnectTimeout {
                    address,
                    timeout: self.open_timeout,
                }
            }
            ureq::Error::Timeout(_) => TransportError::ReadTimeout {
                address,
                timeout: self.read_timeout,
            },
            ureq::Error::HostNotFound => TransportError::Connect {
                address,
                source: io::Error::new(io::ErrorKind::NotFound, "host not found"),
            },
            ureq::Error::ConnectionFailed => TransportError::Connect {
                address,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection failed"),
            },
            ureq::Error::Io(source)
                if matches!(
                    source.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                TransportError::Connect { address, source }
            }
            other => TransportError::Exchange {
                address,
                message: other.to_string(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        let url = format!("{}{}", self.base_url, request.path);

        tokio::task::spawn_blocking(move || execute(&agent, &url, request))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
            .map_err(|e| self.classify(e))
    }

    fn address(&self) -> String {
        self.base_url.clone()
    }
}

/// Run one exchange on the calling thread.
fn execute(agent: &Agent, url: &str, request: HttpRequest) -> Result<HttpResponse, ureq::Error> {
    let HttpRequest {
        method,
        headers,
        body,
        ..
    } = request;

    let mut response = match method {
        HttpMethod::Get => with_headers(agent.get(url), &headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), &headers).call(),
        HttpMethod::Post => send_body(with_headers(agent.post(url), &headers), body),
        HttpMethod::Put => send_body(with_headers(agent.put(url), &headers), body),
        HttpMethod::Patch => send_body(with_headers(agent.patch(url), &headers), body),
    }?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.body_mut().read_to_string()?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(
    builder: RequestBuilder<WithBody>,
    body: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

fn load_identity(cert_path: &Path, key_path: &Path) -> Result<ClientCert, ConfigError> {
    let cert_pem = read_file(cert_path)?;
    let key_pem = read_file(key_path)?;

    let cert = Certificate::from_pem(&cert_pem).map_err(|e| ConfigError::InvalidPem {
        path: cert_path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let key = PrivateKey::from_pem(&key_pem).map_err(|e| ConfigError::InvalidPem {
        path: key_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(ClientCert::new_with_certs(&[cert], key))
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::MissingFile {
        path: path.to_path_buf(),
        source,
    })
}
