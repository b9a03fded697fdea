//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint lifecycle, server, upgrades produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metric macros are no-ops until a recorder is installed
//! - Log level from config, overridable through RUST_LOG

pub mod logging;
pub mod metrics;
