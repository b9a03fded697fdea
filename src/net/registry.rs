//! Managed binding registries.
//!
//! Records of sockets currently held open by the endpoint, kept for
//! operational introspection. The socket-binding manager owns two registries:
//! named (bindings that came from the socket-binding facility) and unnamed
//! (bindings created directly from an interface + port).

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;

use crate::net::binding::ResolutionMode;

/// A socket held open by the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBinding {
    pub name: String,
    pub bound_address: SocketAddr,
}

impl ManagedBinding {
    pub fn new(name: impl Into<String>, bound_address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            bound_address,
        }
    }
}

/// A thread-safe registry of managed bindings, keyed by name.
#[derive(Debug, Default)]
pub struct ManagedBindingRegistry {
    kind: &'static str,
    bindings: DashMap<String, ManagedBinding>,
}

impl ManagedBindingRegistry {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            bindings: DashMap::new(),
        }
    }

    /// Record a binding, replacing any earlier one with the same name.
    pub fn register(&self, binding: ManagedBinding) {
        tracing::debug!(
            registry = self.kind,
            binding = %binding.name,
            address = %binding.bound_address,
            "Managed binding registered"
        );
        self.bindings.insert(binding.name.clone(), binding);
    }

    /// Remove a binding. Only an entry with the same bound address is removed.
    pub fn unregister(&self, binding: &ManagedBinding) {
        let removed = self
            .bindings
            .remove_if(&binding.name, |_, existing| {
                existing.bound_address == binding.bound_address
            })
            .is_some();
        if removed {
            tracing::debug!(
                registry = self.kind,
                binding = %binding.name,
                "Managed binding unregistered"
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<ManagedBinding> {
        self.bindings.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Snapshot of every registered binding.
    pub fn bindings(&self) -> Vec<ManagedBinding> {
        self.bindings.iter().map(|entry| entry.value().clone()).collect()
    }
}

/// Owner of the named and unnamed binding registries.
#[derive(Debug)]
pub struct SocketBindingManager {
    named: Arc<ManagedBindingRegistry>,
    unnamed: Arc<ManagedBindingRegistry>,
}

impl SocketBindingManager {
    pub fn new() -> Self {
        Self {
            named: Arc::new(ManagedBindingRegistry::new("named")),
            unnamed: Arc::new(ManagedBindingRegistry::new("unnamed")),
        }
    }

    pub fn named_registry(&self) -> &Arc<ManagedBindingRegistry> {
        &self.named
    }

    pub fn unnamed_registry(&self) -> &Arc<ManagedBindingRegistry> {
        &self.unnamed
    }

    /// The registry that owns bindings resolved with `mode`.
    pub fn registry_for(&self, mode: ResolutionMode) -> &Arc<ManagedBindingRegistry> {
        match mode {
            ResolutionMode::Unmanaged => &self.unnamed,
            ResolutionMode::Managed => &self.named,
        }
    }
}

impl Default for SocketBindingManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_for_selects_by_mode() {
        let manager = SocketBindingManager::new();
        let binding = ManagedBinding::new("mgmt-http", "127.0.0.1:9990".parse().unwrap());

        manager.registry_for(ResolutionMode::Managed).register(binding.clone());
        assert!(manager.named_registry().contains("mgmt-http"));
        assert!(manager.unnamed_registry().is_empty());

        manager.registry_for(ResolutionMode::Unmanaged).register(binding);
        assert_eq!(manager.unnamed_registry().len(), 1);
    }

    #[test]
    fn unregister_ignores_stale_records() {
        let manager = SocketBindingManager::new();
        let registry = manager.named_registry();
        let old = ManagedBinding::new("mgmt", "127.0.0.1:9990".parse().unwrap());
        let new = ManagedBinding::new("mgmt", "127.0.0.1:9991".parse().unwrap());

        registry.register(new.clone());
        registry.unregister(&old);
        assert_eq!(registry.get("mgmt"), Some(new.clone()));

        registry.unregister(&new);
        assert!(registry.is_empty());
    }
}
