//! Client-side connection settings for talking to a management endpoint.

use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Default connect timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid endpoint uri '{0}': {1}")]
    InvalidUri(String, url::ParseError),

    #[error("unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("endpoint uri has no host: {0}")]
    MissingHost(String),

    #[error("connect timeout must be greater than zero")]
    ZeroTimeout,

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// How a client reaches a management endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConnectionConfig {
    pub uri: Url,
    pub connect_timeout: Duration,
    /// Local address outgoing connections are bound to.
    pub client_bind_address: Option<IpAddr>,
    pub bearer_token: Option<String>,
}

impl ProtocolConnectionConfig {
    /// Parse `uri` and apply the default timeout.
    pub fn create(uri: &str) -> Result<Self, ProtocolError> {
        let parsed = Url::parse(uri).map_err(|e| ProtocolError::InvalidUri(uri.to_string(), e))?;
        let config = Self {
            uri: parsed,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            client_bind_address: None,
            bearer_token: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_client_bind_address(mut self, address: IpAddr) -> Self {
        self.client_bind_address = Some(address);
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self.uri.scheme() {
            "http" | "https" => {}
            other => return Err(ProtocolError::UnsupportedScheme(other.to_string())),
        }
        if !self.uri.has_host() {
            return Err(ProtocolError::MissingHost(self.uri.to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ProtocolError::ZeroTimeout);
        }
        Ok(())
    }

    /// URL of the management API below the endpoint root.
    pub fn management_url(&self, path: &str) -> Result<Url, ProtocolError> {
        let relative = format!("management/{}", path.trim_start_matches('/'));
        let relative = relative.trim_end_matches('/');
        self.uri
            .join(relative)
            .map_err(|e| ProtocolError::InvalidUri(relative.to_string(), e))
    }

    /// A client honoring the timeout, bind address and credentials.
    pub fn build_client(&self) -> Result<reqwest::Client, ProtocolError> {
        self.validate()?;
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &self.bearer_token {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .local_address(self.client_bind_address)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(client)
    }
}
