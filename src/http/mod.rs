//! Embedded management HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server, worker runtime)
//!     → server.rs (router assembly, tracing, CORS)
//!     → "/"            upgrade.rs (101 + hand-off) or console redirect
//!     → "/console"     console.rs (landing for the console mode)
//!     → "/management"  admin handlers (auth, model controller on executor)
//!     → anything else  contexts.rs (static directories, GET remaps)
//! ```

pub mod console;
pub mod contexts;
pub mod server;
pub mod upgrade;

pub use console::ConsoleMode;
pub use server::{ManagementHttpServer, ManagementState};
pub use upgrade::{UpgradeHandler, UpgradeRegistry};
