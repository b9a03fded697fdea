//! Listener descriptors and the shared listener directory.
//!
//! # Responsibilities
//! - Describe the plain and secure management listeners
//! - Tag each listener with the upgrade protocol it accepts
//! - Publish listeners to a directory shared by every endpoint in the process
//!
//! # Design Decisions
//! - One directory entry per protocol, under a fixed name
//! - Removal is unconditional and idempotent

use std::net::SocketAddr;

use dashmap::DashMap;
use serde::Serialize;

use crate::net::binding::BindingSpec;

/// Server name every management listener reports.
pub const SERVER_NAME: &str = "wildfly-management";
/// Directory name of the plain listener.
pub const HTTP_MANAGEMENT: &str = "http-management";
/// Directory name of the secure listener.
pub const HTTPS_MANAGEMENT: &str = "https-management";
/// Upgrade protocol advertised by the management listeners.
pub const UPGRADE_PROTOCOL: &str = "jboss-remoting";
/// Endpoint the upgrade protocol attaches to.
pub const UPGRADE_ENDPOINT: &str = "management-endpoint";

/// Listener protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerProtocol {
    Http,
    Https,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => "http",
            ListenerProtocol::Https => "https",
        }
    }

    /// Directory name for a management listener of this protocol.
    pub fn listener_name(&self) -> &'static str {
        match self {
            ListenerProtocol::Http => HTTP_MANAGEMENT,
            ListenerProtocol::Https => HTTPS_MANAGEMENT,
        }
    }
}

/// Protocol a listener can be upgraded to, and where it lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeMetadata {
    pub protocol_name: String,
    pub endpoint_name: String,
}

impl Default for UpgradeMetadata {
    fn default() -> Self {
        Self {
            protocol_name: UPGRADE_PROTOCOL.to_string(),
            endpoint_name: UPGRADE_ENDPOINT.to_string(),
        }
    }
}

/// A listener advertised to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerDescriptor {
    pub protocol: ListenerProtocol,
    pub name: String,
    pub server_name: String,
    pub address: SocketAddr,
    /// Socket binding the address came from, when managed.
    pub socket_binding: Option<String>,
    pub upgrade: UpgradeMetadata,
}

impl ListenerDescriptor {
    fn new(protocol: ListenerProtocol, spec: &BindingSpec) -> Self {
        Self {
            protocol,
            name: protocol.listener_name().to_string(),
            server_name: SERVER_NAME.to_string(),
            address: spec.address,
            socket_binding: spec.source_name.clone(),
            upgrade: UpgradeMetadata::default(),
        }
    }
}

/// Build one descriptor per resolved address.
pub fn build_listeners(
    plain: Option<&BindingSpec>,
    secure: Option<&BindingSpec>,
) -> Vec<ListenerDescriptor> {
    let mut listeners = Vec::with_capacity(2);
    if let Some(spec) = plain {
        listeners.push(ListenerDescriptor::new(ListenerProtocol::Http, spec));
    }
    if let Some(spec) = secure {
        listeners.push(ListenerDescriptor::new(ListenerProtocol::Https, spec));
    }
    listeners
}

/// Shared registry where endpoints advertise their listeners.
#[derive(Debug, Default)]
pub struct ListenerDirectory {
    listeners: DashMap<String, ListenerDescriptor>,
}

impl ListenerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: ListenerDescriptor) {
        tracing::debug!(
            listener = %listener.name,
            protocol = listener.protocol.as_str(),
            address = %listener.address,
            "Listener published"
        );
        self.listeners.insert(listener.name.clone(), listener);
    }

    pub fn remove_listener(&self, name: &str) {
        self.listeners.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<ListenerDescriptor> {
        self.listeners.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Publish every listener to the directory, if there is one.
pub fn publish(listeners: &[ListenerDescriptor], directory: Option<&ListenerDirectory>) {
    if let Some(directory) = directory {
        for listener in listeners {
            directory.add_listener(listener.clone());
        }
    }
}

/// Remove both management listeners, whether or not they were published.
pub fn unpublish(directory: Option<&ListenerDirectory>) {
    if let Some(directory) = directory {
        directory.remove_listener(HTTP_MANAGEMENT);
        directory.remove_listener(HTTPS_MANAGEMENT);
    }
}
