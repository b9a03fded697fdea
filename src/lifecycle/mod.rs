//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → EndpointDependencies
//!
//! Endpoint (endpoint.rs):
//!     start: resolve bindings → select TLS → publish listeners
//!            → install upgrade service → bind + serve → register bindings
//!     stop:  unpublish → stop server → unregister → remove service
//!
//! Shutdown (shutdown.rs):
//!     stop → signal upgraded connections → drain
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → binary calls stop
//! ```

pub mod endpoint;
pub mod services;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use endpoint::{EndpointDependencies, EndpointState, HttpManagementEndpoint};
pub use services::ServiceRegistry;
pub use shutdown::Shutdown;
