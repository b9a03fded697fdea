//! Management model collaborators.
//!
//! The endpoint does not interpret management operations itself; it hands
//! them to a [`ModelController`] and reports the process state alongside.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A management operation against the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation name (e.g., "read-resource").
    pub operation: String,

    /// Path of the target resource, outermost segment first.
    #[serde(default)]
    pub address: Vec<String>,

    /// Attribute name for attribute operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Attribute value for write operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Operation {
    pub fn read_resource(address: Vec<String>) -> Self {
        Self {
            operation: "read-resource".to_string(),
            address,
            name: None,
            value: None,
        }
    }

    /// Parse a slash-separated resource path into an address.
    pub fn address_from_path(path: &str) -> Vec<String> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Errors from executing a management operation.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Resource not found: /{0}")]
    NotFound(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Operation failed: {0}")]
    Failed(String),
}

/// Executes management operations.
pub trait ModelController: Send + Sync {
    fn execute(&self, operation: Operation) -> Result<Value, ModelError>;
}

/// A model controller over an in-memory JSON tree.
///
/// Resources are JSON objects; a resource's children are nested objects.
#[derive(Debug, Default)]
pub struct InMemoryModelController {
    root: RwLock<Value>,
}

impl InMemoryModelController {
    pub fn new(root: Value) -> Self {
        Self {
            root: RwLock::new(root),
        }
    }

    fn lock_poisoned() -> ModelError {
        ModelError::Failed("model lock poisoned".to_string())
    }
}

fn navigate<'a>(root: &'a Value, address: &[String]) -> Result<&'a Value, ModelError> {
    address.iter().try_fold(root, |node, segment| {
        node.get(segment)
            .ok_or_else(|| ModelError::NotFound(address.join("/")))
    })
}

fn navigate_mut<'a>(root: &'a mut Value, address: &[String]) -> Result<&'a mut Map<String, Value>, ModelError> {
    let mut node = root;
    for segment in address {
        node = node
            .get_mut(segment)
            .ok_or_else(|| ModelError::NotFound(address.join("/")))?;
    }
    node.as_object_mut()
        .ok_or_else(|| ModelError::NotFound(address.join("/")))
}

impl ModelController for InMemoryModelController {
    fn execute(&self, operation: Operation) -> Result<Value, ModelError> {
        match operation.operation.as_str() {
            "read-resource" => {
                let root = self.root.read().map_err(|_| Self::lock_poisoned())?;
                navigate(&root, &operation.address).cloned()
            }
            "read-attribute" => {
                let name = operation.name.ok_or(ModelError::MissingParameter("name"))?;
                let root = self.root.read().map_err(|_| Self::lock_poisoned())?;
                let resource = navigate(&root, &operation.address)?;
                Ok(resource.get(&name).cloned().unwrap_or(Value::Null))
            }
            "write-attribute" => {
                let name = operation.name.ok_or(ModelError::MissingParameter("name"))?;
                let value = operation.value.unwrap_or(Value::Null);
                let mut root = self.root.write().map_err(|_| Self::lock_poisoned())?;
                navigate_mut(&mut root, &operation.address)?.insert(name, value);
                Ok(Value::Null)
            }
            other => Err(ModelError::UnknownOperation(other.to_string())),
        }
    }
}

/// Runtime state of the managed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessState {
    Running,
    ReloadRequired,
    RestartRequired,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::ReloadRequired => "reload-required",
            ProcessState::RestartRequired => "restart-required",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ProcessState::ReloadRequired,
            2 => ProcessState::RestartRequired,
            _ => ProcessState::Running,
        }
    }
}

/// Tracks the process state reported on management responses.
#[derive(Debug, Default)]
pub struct ProcessStateService {
    state: AtomicU8,
}

impl ProcessStateService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ProcessState) {
        let previous = ProcessState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::info!(from = previous.as_str(), to = state.as_str(), "Process state changed");
        }
    }
}
