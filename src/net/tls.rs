//! TLS configuration, certificate loading and client-auth policy.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::ring::default_provider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading TLS material or building a server configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Certificate file not found: {0}")]
    CertificateNotFound(String),

    #[error("Private key file not found: {0}")]
    KeyNotFound(String),

    #[error("No private key found in {0}")]
    MissingKey(String),

    #[error("No certificates found in {0}")]
    EmptyCertificateChain(String),

    #[error("Client certificate authentication requires a trust store")]
    MissingTrustStore,

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("Client verifier error: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Server certificate chain, key and optional client trust roots.
///
/// Cheap to clone; the material is shared.
#[derive(Clone)]
pub struct TlsContext {
    inner: Arc<TlsMaterial>,
}

struct TlsMaterial {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_roots: Option<Arc<RootCertStore>>,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("certificates", &self.inner.certs.len())
            .field("client_roots", &self.inner.client_roots.as_ref().map(|r| r.len()))
            .finish()
    }
}

impl TlsContext {
    pub fn new(certs: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self {
            inner: Arc::new(TlsMaterial {
                certs,
                key,
                client_roots: None,
            }),
        }
    }

    /// Attach the trust roots client certificates are verified against.
    pub fn with_client_roots(self, roots: RootCertStore) -> Self {
        let material = TlsMaterial {
            certs: self.inner.certs.clone(),
            key: self.inner.key.clone_key(),
            client_roots: Some(Arc::new(roots)),
        };
        Self {
            inner: Arc::new(material),
        }
    }

    /// Load a certificate chain and private key from PEM files.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        if !cert_path.exists() {
            return Err(TlsError::CertificateNotFound(cert_path.display().to_string()));
        }
        if !key_path.exists() {
            return Err(TlsError::KeyNotFound(key_path.display().to_string()));
        }

        let certs = read_certificates(cert_path)?;
        let mut reader = open(key_path)?;
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|source| io_error(key_path, source))?
            .ok_or_else(|| TlsError::MissingKey(key_path.display().to_string()))?;

        Ok(Self::new(certs, key))
    }

    /// Load client trust roots from a PEM bundle.
    pub fn load_client_roots(self, ca_path: &Path) -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        for cert in read_certificates(ca_path)? {
            roots.add(cert)?;
        }
        Ok(self.with_client_roots(roots))
    }

    pub fn has_client_roots(&self) -> bool {
        self.inner.client_roots.is_some()
    }

    /// Build the rustls server configuration for a client-auth mode.
    pub fn server_config(&self, mode: Option<ClientAuthMode>) -> Result<ServerConfig, TlsError> {
        let provider = Arc::new(default_provider());
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = match mode {
            Some(mode @ (ClientAuthMode::Requested | ClientAuthMode::Required)) => {
                let roots = self
                    .inner
                    .client_roots
                    .clone()
                    .ok_or(TlsError::MissingTrustStore)?;
                let mut verifier = WebPkiClientVerifier::builder_with_provider(roots, provider);
                if mode == ClientAuthMode::Requested {
                    verifier = verifier.allow_unauthenticated();
                }
                builder.with_client_cert_verifier(verifier.build()?)
            }
            Some(ClientAuthMode::NotRequested) | None => builder.with_no_client_auth(),
        };

        let mut config =
            builder.with_single_cert(self.inner.certs.clone(), self.inner.key.clone_key())?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(config)
    }

    /// The axum-server acceptor configuration for a client-auth mode.
    pub fn rustls_config(&self, mode: Option<ClientAuthMode>) -> Result<RustlsConfig, TlsError> {
        Ok(RustlsConfig::from_config(Arc::new(self.server_config(mode)?)))
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> TlsError {
    TlsError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| io_error(path, source))?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertificateChain(path.display().to_string()));
    }
    Ok(certs)
}

/// Authentication mechanisms a security realm can support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMechanism {
    ClientCert,
    Digest,
    Plain,
    Local,
    Kerberos,
}

impl AuthMechanism {
    /// Mechanisms that authenticate with a username and password.
    pub fn is_password_based(&self) -> bool {
        matches!(self, AuthMechanism::Digest | AuthMechanism::Plain)
    }
}

/// Whether the TLS handshake asks for a client certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientAuthMode {
    NotRequested,
    Requested,
    Required,
}

/// A security realm: TLS identity plus supported mechanisms.
#[derive(Debug, Clone, Default)]
pub struct SecurityRealm {
    pub name: String,
    pub tls: Option<TlsContext>,
    pub mechanisms: HashSet<AuthMechanism>,
}

impl SecurityRealm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, tls: TlsContext) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_mechanisms(mut self, mechanisms: impl IntoIterator<Item = AuthMechanism>) -> Self {
        self.mechanisms.extend(mechanisms);
        self
    }
}

/// Effective TLS context and client-auth mode for a start cycle.
#[derive(Debug, Clone, Default)]
pub struct SecurityPolicy {
    pub tls: Option<TlsContext>,
    pub client_auth: Option<ClientAuthMode>,
}

impl SecurityPolicy {
    /// Select the TLS policy.
    ///
    /// An explicit context wins and never derives a client-auth mode. The
    /// realm is consulted only when no explicit context is supplied.
    pub fn select(explicit: Option<&TlsContext>, realm: Option<&SecurityRealm>) -> Self {
        match (explicit, realm) {
            (Some(tls), _) => Self {
                tls: Some(tls.clone()),
                client_auth: None,
            },
            (None, Some(realm)) => Self {
                tls: realm.tls.clone(),
                client_auth: client_auth_mode(&realm.mechanisms),
            },
            (None, None) => Self::default(),
        }
    }
}

/// Derive the client-auth mode from a set of supported mechanisms.
pub fn client_auth_mode(mechanisms: &HashSet<AuthMechanism>) -> Option<ClientAuthMode> {
    if !mechanisms.contains(&AuthMechanism::ClientCert) {
        return None;
    }
    if mechanisms.iter().any(AuthMechanism::is_password_based) {
        // Password auth is still possible, so the certificate stays optional.
        Some(ClientAuthMode::Requested)
    } else {
        Some(ClientAuthMode::Required)
    }
}
