//! Client configuration.
//!
//! A `ClientConfig` is immutable once built. The only process-wide values
//! are the named defaults below; environment variables are read only when
//! the caller asks for [`ClientConfig::from_env`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Socket a local LXD daemon listens on.
pub const DEFAULT_SOCKET_PATH: &str = "/var/lib/lxd/unix.socket";

/// Path prefix of every API endpoint.
pub const API_PREFIX: &str = "/1.0";

pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

const UNIX_SCHEME: &str = "unix://";

/// Where the API is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Unix domain socket path.
    Unix(PathBuf),
    /// `http://` or `https://` base URL without a trailing slash.
    Http(String),
}

impl Address {
    /// Parse `unix:///path`, `http://host[:port]` or `https://host[:port]`.
    ///
    /// Without a scheme the value is a network address and `https://` is
    /// assumed.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        let invalid = |reason: &str| ConfigError::InvalidAddress {
            address: value.to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("empty address"));
        }

        if let Some(path) = value.strip_prefix(UNIX_SCHEME) {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(Address::Unix(PathBuf::from(path)));
        }

        let lower = value.to_ascii_lowercase();
        let rest = if lower.starts_with("https://") {
            &value["https://".len()..]
        } else if lower.starts_with("http://") {
            &value["http://".len()..]
        } else if value.contains("://") {
            return Err(invalid("unsupported scheme"));
        } else {
            return Address::parse(&format!("https://{value}"));
        };

        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok(Address::Http(value.trim_end_matches('/').to_string()))
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, Address::Unix(_))
    }

    pub fn is_tls(&self) -> bool {
        match self {
            Address::Unix(_) => false,
            Address::Http(url) => url.to_ascii_lowercase().starts_with("https://"),
        }
    }
}

impl Default for Address {
    fn default() -> Self {
        Address::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl FromStr for Address {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Unix(path) => write!(f, "{UNIX_SCHEME}{}", path.display()),
            Address::Http(url) => f.write_str(url),
        }
    }
}

/// What the dispatcher does with an asynchronous response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Wait for the operation and surface its failure (default).
    #[default]
    Block,
    /// Return the async envelope at once; the caller polls the operation.
    FireAndForget,
}

/// Configuration for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub address: Address,
    pub wait_mode: WaitMode,
    /// Limit on establishing a connection.
    pub open_timeout: Duration,
    /// Limit on receiving a response once the request is sent.
    pub read_timeout: Duration,
    /// Passed to the server as `?timeout=` on operation waits. `None` lets
    /// the server wait until the operation finishes.
    pub wait_timeout: Option<Duration>,
    /// PEM client certificate for mutual TLS.
    pub client_cert: Option<PathBuf>,
    /// PEM private key matching `client_cert`.
    pub client_key: Option<PathBuf>,
    /// Verify the server certificate. Disabling this is an explicit opt-out.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: Address::default(),
            wait_mode: WaitMode::Block,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            wait_timeout: Some(DEFAULT_WAIT_TIMEOUT),
            client_cert: None,
            client_key: None,
            verify_tls: true,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LXD_ADDRESS` | `unix:///var/lib/lxd/unix.socket` |
    /// | `LXD_WAIT` | `true` |
    /// | `LXD_OPEN_TIMEOUT_SECS` | `60` |
    /// | `LXD_READ_TIMEOUT_SECS` | `60` |
    /// | `LXD_WAIT_TIMEOUT_SECS` | `30` (`none` for no timeout) |
    /// | `LXD_CLIENT_CERT` | unset |
    /// | `LXD_CLIENT_KEY` | unset |
    /// | `LXD_TLS_VERIFY` | `true` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = ClientConfig::builder();

        if let Some(address) = lookup("LXD_ADDRESS") {
            builder = builder.address(Address::parse(&address)?);
        }
        if let Some(wait) = lookup("LXD_WAIT") {
            let wait = parse_bool("LXD_WAIT", &wait)?;
            builder = builder.wait_mode(if wait {
                WaitMode::Block
            } else {
                WaitMode::FireAndForget
            });
        }
        if let Some(secs) = lookup("LXD_OPEN_TIMEOUT_SECS") {
            builder = builder.open_timeout(parse_secs("LXD_OPEN_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("LXD_READ_TIMEOUT_SECS") {
            builder = builder.read_timeout(parse_secs("LXD_READ_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("LXD_WAIT_TIMEOUT_SECS") {
            builder = if secs.trim().eq_ignore_ascii_case("none") {
                builder.no_wait_timeout()
            } else {
                builder.wait_timeout(parse_secs("LXD_WAIT_TIMEOUT_SECS", &secs)?)
            };
        }
        if let Some(cert) = lookup("LXD_CLIENT_CERT") {
            builder = builder.client_cert(cert);
        }
        if let Some(key) = lookup("LXD_CLIENT_KEY") {
            builder = builder.client_key(key);
        }
        if let Some(verify) = lookup("LXD_TLS_VERIFY") {
            builder = builder.verify_tls(parse_bool("LXD_TLS_VERIFY", &verify)?);
        }

        builder.build()
    }

    /// Check the settings without touching the filesystem or network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.open_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("open_timeout"));
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("read_timeout"));
        }
        if self.wait_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout("wait_timeout"));
        }
        match (&self.client_cert, &self.client_key) {
            (Some(_), None) | (None, Some(_)) => return Err(ConfigError::IncompleteIdentity),
            (Some(_), Some(_)) if !self.address.is_tls() => {
                return Err(ConfigError::TlsNotApplicable(self.address.to_string()))
            }
            _ => {}
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn address(mut self, address: Address) -> Self {
        self.config.address = address;
        self
    }

    /// Connect to a Unix socket path.
    pub fn unix_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.address = Address::Unix(path.into());
        self
    }

    pub fn wait_mode(mut self, mode: WaitMode) -> Self {
        self.config.wait_mode = mode;
        self
    }

    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    pub fn no_wait_timeout(mut self) -> Self {
        self.config.wait_timeout = None;
        self
    }

    pub fn client_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.client_cert = Some(path.into());
        self
    }

    pub fn client_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.client_key = Some(path.into());
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.config.verify_tls = verify;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidEnv {
            name,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn parses_unix_address() {
        let addr = Address::parse("unix:///var/lib/lxd/unix.socket").unwrap();
        assert_eq!(addr, Address::Unix(PathBuf::from("/var/lib/lxd/unix.socket")));
        assert!(addr.is_unix());
        assert_eq!(addr.to_string(), "unix:///var/lib/lxd/unix.socket");
    }

    #[test]
    fn parses_http_addresses() {
        let addr = Address::parse("https://lxd.example:8443/").unwrap();
        assert_eq!(addr, Address::Http("https://lxd.example:8443".into()));
        assert!(addr.is_tls());

        let addr = Address::parse("http://localhost.lxd").unwrap();
        assert!(!addr.is_tls());
    }

    #[test]
    fn missing_scheme_means_https() {
        let addr: Address = "10.0.0.5:8443".parse().unwrap();
        assert_eq!(addr, Address::Http("https://10.0.0.5:8443".into()));
    }

    #[test]
    fn rejects_bad_addresses() {
        for bad in ["", "unix://", "https://", "ftp://host", "  "] {
            assert!(
                matches!(Address::parse(bad), Err(ConfigError::InvalidAddress { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn defaults_target_local_socket_and_block() {
        let config = ClientConfig::default();
        assert_eq!(config.address, Address::Unix(DEFAULT_SOCKET_PATH.into()));
        assert_eq!(config.wait_mode, WaitMode::Block);
        assert_eq!(config.wait_timeout, Some(DEFAULT_WAIT_TIMEOUT));
        assert!(config.verify_tls);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_requires_cert_and_key_together() {
        let result = ClientConfig::builder()
            .address(Address::parse("https://lxd:8443").unwrap())
            .client_cert("/tmp/client.crt")
            .build();
        assert!(matches!(result, Err(ConfigError::IncompleteIdentity)));
    }

    #[test]
    fn builder_rejects_identity_on_plain_transport() {
        let result = ClientConfig::builder()
            .unix_socket("/tmp/lxd.sock")
            .client_cert("/tmp/client.crt")
            .client_key("/tmp/client.key")
            .build();
        assert!(matches!(result, Err(ConfigError::TlsNotApplicable(_))));
    }

    #[test]
    fn builder_rejects_zero_timeouts() {
        let result = ClientConfig::builder().read_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(ConfigError::ZeroTimeout("read_timeout"))));
    }

    #[test]
    fn from_lookup_reads_every_variable() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LXD_ADDRESS", "https://lxd:8443"),
            ("LXD_WAIT", "false"),
            ("LXD_OPEN_TIMEOUT_SECS", "5"),
            ("LXD_READ_TIMEOUT_SECS", "90"),
            ("LXD_WAIT_TIMEOUT_SECS", "none"),
            ("LXD_CLIENT_CERT", "/etc/lxd/client.crt"),
            ("LXD_CLIENT_KEY", "/etc/lxd/client.key"),
            ("LXD_TLS_VERIFY", "no"),
        ]))
        .unwrap();

        assert_eq!(config.address, Address::Http("https://lxd:8443".into()));
        assert_eq!(config.wait_mode, WaitMode::FireAndForget);
        assert_eq!(config.open_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(90));
        assert_eq!(config.wait_timeout, None);
        assert_eq!(config.client_cert, Some(PathBuf::from("/etc/lxd/client.crt")));
        assert!(!config.verify_tls);
    }

    #[test]
    fn from_lookup_defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        let result = ClientConfig::from_lookup(lookup(&[("LXD_WAIT", "maybe")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { name: "LXD_WAIT", .. })));
    }
}
