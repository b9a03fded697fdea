//! Registry of internal services addressable by name.
//!
//! Components in the same process look up shared values here (for example
//! the upgrade multiplexer of a started management endpoint) without a
//! direct reference to the component that installed them.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

/// Name the plain upgrade multiplexer is installed under.
pub const HTTP_UPGRADE_SERVICE_NAME: &str = "http-upgrade-registry.http-management";
/// Alias for the secure variant. Resolves to the same multiplexer.
pub const HTTPS_UPGRADE_SERVICE_NAME: &str = "http-upgrade-registry.https-management";

type ServiceValue = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceValue>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `value` under `name` and every alias.
    pub fn install<T: Any + Send + Sync>(&self, name: &str, value: Arc<T>, aliases: &[&str]) {
        let value: ServiceValue = value;
        for key in std::iter::once(name).chain(aliases.iter().copied()) {
            self.services.insert(key.to_string(), Arc::clone(&value));
        }
        tracing::debug!(service = name, ?aliases, "Service installed");
    }

    /// Look up a service, downcast to the expected type.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        let value = self.services.get(name)?.value().clone();
        value.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Remove a service and its aliases.
    pub fn remove(&self, name: &str, aliases: &[&str]) {
        for key in std::iter::once(name).chain(aliases.iter().copied()) {
            self.services.remove(key);
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_to_same_value() {
        let registry = ServiceRegistry::new();
        let value = Arc::new(42_u32);
        registry.install(HTTP_UPGRADE_SERVICE_NAME, value.clone(), &[HTTPS_UPGRADE_SERVICE_NAME]);

        let plain = registry.get::<u32>(HTTP_UPGRADE_SERVICE_NAME).unwrap();
        let secure = registry.get::<u32>(HTTPS_UPGRADE_SERVICE_NAME).unwrap();
        assert!(Arc::ptr_eq(&plain, &secure));
        assert!(Arc::ptr_eq(&plain, &value));
    }

    #[test]
    fn wrong_type_is_none() {
        let registry = ServiceRegistry::new();
        registry.install("svc", Arc::new("text".to_string()), &[]);
        assert!(registry.get::<u32>("svc").is_none());
        assert!(registry.get::<String>("svc").is_some());
    }

    #[test]
    fn remove_drops_aliases() {
        let registry = ServiceRegistry::new();
        registry.install("svc", Arc::new(1_u8), &["alias"]);
        registry.remove("svc", &["alias"]);
        assert!(registry.names().is_empty());
    }
}
