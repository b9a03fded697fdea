//! Shared utilities for endpoint integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use serde_json::json;
use tokio::runtime::Handle;

use mgmt_endpoint::controller::{InMemoryModelController, ProcessStateService};
use mgmt_endpoint::lifecycle::{EndpointDependencies, ServiceRegistry};
use mgmt_endpoint::net::{ListenerDirectory, NetworkInterfaceBinding, SocketBindingManager, TlsContext};

/// Collaborators shared between an endpoint and the assertions of a test.
pub struct Fixture {
    pub bindings: Arc<SocketBindingManager>,
    pub listeners: Arc<ListenerDirectory>,
    pub services: Arc<ServiceRegistry>,
    pub process_state: Arc<ProcessStateService>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(SocketBindingManager::new()),
            listeners: Arc::new(ListenerDirectory::new()),
            services: Arc::new(ServiceRegistry::new()),
            process_state: Arc::new(ProcessStateService::new()),
        }
    }

    /// Dependencies wired to this fixture, with no socket configuration yet.
    /// Must be called from within a tokio runtime.
    pub fn deps(&self) -> EndpointDependencies {
        EndpointDependencies::new()
            .with_model_controller(Arc::new(model()))
            .with_process_state(self.process_state.clone())
            .with_socket_binding_manager(self.bindings.clone())
            .with_listener_directory(self.listeners.clone())
            .with_service_registry(self.services.clone())
            .with_worker(Handle::current())
            .with_executor(Handle::current())
            .with_shutdown_timeout(Duration::from_secs(2))
    }
}

pub fn model() -> InMemoryModelController {
    InMemoryModelController::new(json!({
        "product-name": "test-server",
        "subsystem": {
            "logging": { "level": "INFO" },
        },
    }))
}

pub fn loopback() -> NetworkInterfaceBinding {
    NetworkInterfaceBinding::new("management", "127.0.0.1".parse().unwrap())
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Hold a loopback port so that binding it again conflicts.
pub fn occupy_port() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub fn self_signed_tls() -> TlsContext {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    TlsContext::new(
        vec![cert.der().clone()],
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
    )
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// A certificate authority and one client certificate it issued.
pub struct ClientCa {
    /// Trust roots containing only the authority.
    pub roots: RootCertStore,
    /// Client certificate followed by its private key, PEM encoded.
    pub identity_pem: Vec<u8>,
}

pub fn client_ca() -> ClientCa {
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name.push(DnType::CommonName, "management test ca");
    let ca_key = KeyPair::generate().unwrap();
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();

    let mut client_params = CertificateParams::new(vec!["management-client".to_string()]).unwrap();
    client_params.distinguished_name.push(DnType::CommonName, "management-client");
    client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let client_key = KeyPair::generate().unwrap();
    let client_cert = client_params.signed_by(&client_key, &ca_cert, &ca_key).unwrap();

    let mut roots = RootCertStore::empty();
    roots.add(ca_cert.der().clone()).unwrap();

    let identity_pem = format!("{}{}", client_cert.pem(), client_key.serialize_pem()).into_bytes();
    ClientCa { roots, identity_pem }
}

/// Like [`client`], presenting a client certificate during the handshake.
pub fn client_with_identity(identity_pem: &[u8]) -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(true)
        .identity(reqwest::Identity::from_pem(identity_pem).unwrap())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}
