//! Configuration schema definitions.
//!
//! This module defines the configuration file of the management endpoint
//! binary. All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

use crate::http::console::ConsoleMode;
use crate::net::binding::{NetworkInterfaceBinding, SocketBinding};
use crate::net::tls::AuthMechanism;

/// Root configuration of the management endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Socket configuration of the HTTP management interface.
    pub http: HttpInterfaceConfig,

    /// Explicit TLS identity; takes precedence over the realm's.
    pub tls: Option<TlsConfig>,

    /// Security realm backing the interface.
    pub security_realm: Option<SecurityRealmConfig>,

    pub auth: AuthConfig,

    pub console: ConsoleConfig,

    /// Origins allowed to issue cross-origin management requests.
    pub allowed_origins: Vec<String>,

    /// Grace period for in-flight requests on stop.
    pub shutdown_timeout_secs: u64,

    pub observability: ObservabilityConfig,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            http: HttpInterfaceConfig {
                interface: Some(NetworkInterfaceBinding::new(
                    "management",
                    [127, 0, 0, 1].into(),
                )),
                port: Some(9990),
                ..HttpInterfaceConfig::default()
            },
            tls: None,
            security_realm: None,
            auth: AuthConfig::default(),
            console: ConsoleConfig::default(),
            allowed_origins: Vec::new(),
            shutdown_timeout_secs: 10,
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Socket configuration: either unmanaged (interface + ports) or managed
/// (socket bindings). Unmanaged settings win when both are present.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpInterfaceConfig {
    pub interface: Option<NetworkInterfaceBinding>,
    pub secure_interface: Option<NetworkInterfaceBinding>,
    /// Values ≤ 0 mean "no plain socket".
    pub port: Option<i32>,
    /// Values ≤ 0 mean "no secure socket".
    pub secure_port: Option<i32>,
    pub socket_binding: Option<SocketBinding>,
    pub secure_socket_binding: Option<SocketBinding>,
}

/// PEM files of a TLS identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// CA bundle used to verify client certificates (PEM).
    #[serde(default)]
    pub client_ca_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityRealmConfig {
    pub name: String,

    #[serde(default)]
    pub mechanisms: Vec<AuthMechanism>,

    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

/// Authentication of `/management` requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token; no authentication when unset.
    pub bearer_token: Option<String>,

    /// Realm named in the `WWW-Authenticate` challenge.
    pub realm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            realm: "ManagementRealm".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub mode: ConsoleMode,
    pub slot: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9091".to_string(),
        }
    }
}
