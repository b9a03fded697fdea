//! Dynamically added management contexts.
//!
//! Other components add contexts to a running endpoint: static content
//! served from a directory, or GET paths remapped onto the management API.
//! The table is swapped atomically so request handling never blocks on it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Rewrites a GET path under a context into a management resource path.
pub trait PathRemapper: Send + Sync {
    /// `None` means the path has no management equivalent.
    fn remap_path(&self, original: &str) -> Option<String>;
}

impl<F> PathRemapper for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn remap_path(&self, original: &str) -> Option<String> {
        (self)(original)
    }
}

/// A context mounted under `/<name>`.
#[derive(Clone)]
pub enum ManagementContext {
    /// Files served from a directory.
    Static(PathBuf),
    /// GET requests remapped onto management reads.
    GetRemap(Arc<dyn PathRemapper>),
}

impl std::fmt::Debug for ManagementContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagementContext::Static(dir) => f.debug_tuple("Static").field(dir).finish(),
            ManagementContext::GetRemap(_) => f.write_str("GetRemap"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ContextTable {
    contexts: ArcSwap<HashMap<String, ManagementContext>>,
}

/// Context names are stored without surrounding slashes.
pub fn normalize_name(name: &str) -> String {
    name.trim_matches('/').to_string()
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a context, replacing any context with the same name.
    pub fn add(&self, name: &str, context: ManagementContext) {
        let name = normalize_name(name);
        tracing::debug!(context = %name, kind = ?context, "Management context added");
        self.contexts.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(name.clone(), context.clone());
            next
        });
    }

    pub fn remove(&self, name: &str) -> bool {
        let name = normalize_name(name);
        let previous = self.contexts.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(&name);
            next
        });
        previous.contains_key(&name)
    }

    pub fn get(&self, name: &str) -> Option<ManagementContext> {
        self.contexts.load().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Split a request path into the context it targets and the remainder.
    ///
    /// The remainder always starts with `/`.
    pub fn route<'a>(&self, path: &'a str) -> Option<(ManagementContext, &'a str)> {
        let trimmed = path.trim_start_matches('/');
        let (name, rest) = match trimmed.find('/') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx..]),
            None => (trimmed, "/"),
        };
        self.get(name).map(|context| (context, rest))
    }
}
