//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured interface/port or socket bindings
//!     → binding.rs (resolve plain/secure addresses, pick resolution mode)
//!     → tls.rs (TLS context + client-auth policy for the secure socket)
//!     → listener.rs (describe listeners, publish to the listener directory)
//!     → [embedded server binds the sockets]
//!     → registry.rs (record bound sockets as managed bindings)
//! ```
//!
//! # Design Decisions
//! - Resolution mode is decided once per start and carried to stop
//! - Registries are shared, thread-safe, and owned outside the endpoint

pub mod binding;
pub mod listener;
pub mod registry;
pub mod tls;

pub use binding::{
    BindingInputs, BindingSpec, NetworkInterfaceBinding, ResolutionMode, ResolvedBindings,
    SocketBinding,
};
pub use listener::{ListenerDescriptor, ListenerDirectory, ListenerProtocol};
pub use registry::{ManagedBinding, ManagedBindingRegistry, SocketBindingManager};
pub use tls::{AuthMechanism, ClientAuthMode, SecurityPolicy, SecurityRealm, TlsContext, TlsError};
