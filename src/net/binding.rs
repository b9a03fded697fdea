//! Bind address resolution.
//!
//! # Responsibilities
//! - Describe network interfaces and named socket bindings
//! - Pick the resolution strategy for a start cycle (unmanaged or managed)
//! - Produce the plain and secure bind addresses for the embedded server
//!
//! # Design Decisions
//! - An unmanaged interface wins outright; managed bindings are then ignored
//! - Missing addresses are not an error; the caller decides what is usable

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// A named network interface resolved to a single address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceBinding {
    /// Interface name (e.g., "management").
    pub name: String,
    /// Address the interface resolved to.
    pub address: IpAddr,
}

impl NetworkInterfaceBinding {
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

/// A named socket binding from the socket-binding facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketBinding {
    /// Binding name (e.g., "management-http").
    pub name: String,
    /// Interface the binding is attached to.
    pub interface: NetworkInterfaceBinding,
    /// Port; 0 asks the OS for an ephemeral port.
    pub port: u16,
}

impl SocketBinding {
    pub fn new(name: impl Into<String>, interface: NetworkInterfaceBinding, port: u16) -> Self {
        Self {
            name: name.into(),
            interface,
            port,
        }
    }

    /// The socket address this binding asks for.
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.interface.address, self.port)
    }
}

/// Which binding strategy a start cycle used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Raw interface + port, bypassing named socket bindings.
    Unmanaged,
    /// Named socket bindings.
    Managed,
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionMode::Unmanaged => write!(f, "unmanaged"),
            ResolutionMode::Managed => write!(f, "managed"),
        }
    }
}

/// A resolved plain or secure bind address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSpec {
    pub address: SocketAddr,
    /// Socket binding the address came from, when managed.
    pub source_name: Option<String>,
}

/// Inputs to binding resolution, as configured for the endpoint.
#[derive(Debug, Clone, Default)]
pub struct BindingInputs {
    pub interface: Option<NetworkInterfaceBinding>,
    pub secure_interface: Option<NetworkInterfaceBinding>,
    pub port: Option<i32>,
    pub secure_port: Option<i32>,
    pub socket_binding: Option<SocketBinding>,
    pub secure_socket_binding: Option<SocketBinding>,
}

/// Result of resolving the bindings for one start cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBindings {
    pub plain: Option<BindingSpec>,
    pub secure: Option<BindingSpec>,
    pub mode: ResolutionMode,
}

impl ResolvedBindings {
    /// Every address that will be bound, plain first.
    pub fn attempted(&self) -> Vec<SocketAddr> {
        self.plain
            .iter()
            .chain(self.secure.iter())
            .map(|spec| spec.address)
            .collect()
    }
}

/// Resolve the plain and secure bind addresses.
pub fn resolve(inputs: &BindingInputs) -> ResolvedBindings {
    match &inputs.interface {
        Some(interface) => {
            let plain = usable_port(inputs.port).map(|port| BindingSpec {
                address: SocketAddr::new(interface.address, port),
                source_name: None,
            });
            let secure = usable_port(inputs.secure_port).map(|port| {
                let address = inputs
                    .secure_interface
                    .as_ref()
                    .unwrap_or(interface)
                    .address;
                BindingSpec {
                    address: SocketAddr::new(address, port),
                    source_name: None,
                }
            });
            ResolvedBindings {
                plain,
                secure,
                mode: ResolutionMode::Unmanaged,
            }
        }
        None => ResolvedBindings {
            plain: inputs.socket_binding.as_ref().map(managed_spec),
            secure: inputs.secure_socket_binding.as_ref().map(managed_spec),
            mode: ResolutionMode::Managed,
        },
    }
}

fn managed_spec(binding: &SocketBinding) -> BindingSpec {
    BindingSpec {
        address: binding.socket_address(),
        source_name: Some(binding.name.clone()),
    }
}

fn usable_port(port: Option<i32>) -> Option<u16> {
    let port = port.filter(|p| *p > 0)?;
    match u16::try_from(port) {
        Ok(port) => Some(port),
        Err(_) => {
            tracing::warn!(port, "Ignoring out of range port");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(addr: &str) -> NetworkInterfaceBinding {
        NetworkInterfaceBinding::new("management", addr.parse().unwrap())
    }

    #[test]
    fn unmanaged_interface_wins_over_socket_bindings() {
        let inputs = BindingInputs {
            interface: Some(iface("10.0.0.5")),
            port: Some(9990),
            socket_binding: Some(SocketBinding::new("mgmt", iface("127.0.0.1"), 19990)),
            secure_socket_binding: Some(SocketBinding::new("mgmt-ssl", iface("127.0.0.1"), 19993)),
            ..Default::default()
        };
        let resolved = resolve(&inputs);
        assert_eq!(resolved.mode, ResolutionMode::Unmanaged);
        assert_eq!(resolved.plain.unwrap().address, "10.0.0.5:9990".parse().unwrap());
        assert!(resolved.secure.is_none());
    }

    #[test]
    fn non_positive_secure_port_produces_no_secure_address() {
        for secure_port in [None, Some(0), Some(-1)] {
            let inputs = BindingInputs {
                interface: Some(iface("10.0.0.5")),
                port: Some(9990),
                secure_port,
                ..Default::default()
            };
            assert!(resolve(&inputs).secure.is_none());
        }
    }

    #[test]
    fn secure_address_falls_back_to_plain_interface() {
        let inputs = BindingInputs {
            interface: Some(iface("10.0.0.5")),
            secure_port: Some(9993),
            ..Default::default()
        };
        let resolved = resolve(&inputs);
        assert!(resolved.plain.is_none());
        assert_eq!(resolved.secure.unwrap().address, "10.0.0.5:9993".parse().unwrap());
    }

    #[test]
    fn secure_interface_is_used_when_supplied() {
        let inputs = BindingInputs {
            interface: Some(iface("10.0.0.5")),
            secure_interface: Some(iface("10.0.0.6")),
            port: Some(9990),
            secure_port: Some(9993),
            ..Default::default()
        };
        let resolved = resolve(&inputs);
        assert_eq!(
            resolved.attempted(),
            vec!["10.0.0.5:9990".parse().unwrap(), "10.0.0.6:9993".parse().unwrap()]
        );
    }

    #[test]
    fn managed_bindings_keep_their_names() {
        let inputs = BindingInputs {
            socket_binding: Some(SocketBinding::new("mgmt", iface("127.0.0.1"), 9990)),
            secure_socket_binding: Some(SocketBinding::new("mgmt-ssl", iface("127.0.0.1"), 9993)),
            ..Default::default()
        };
        let resolved = resolve(&inputs);
        assert_eq!(resolved.mode, ResolutionMode::Managed);
        assert_eq!(resolved.plain.unwrap().source_name.as_deref(), Some("mgmt"));
        assert_eq!(resolved.secure.unwrap().source_name.as_deref(), Some("mgmt-ssl"));
    }

    #[test]
    fn nothing_configured_resolves_to_nothing() {
        let resolved = resolve(&BindingInputs::default());
        assert_eq!(resolved.mode, ResolutionMode::Managed);
        assert!(resolved.attempted().is_empty());
    }
}
