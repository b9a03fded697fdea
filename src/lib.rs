//! HTTP management endpoint library.

pub mod admin;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;

pub use config::schema::ManagementConfig;
pub use error::EndpointError;
pub use http::ManagementHttpServer;
pub use lifecycle::{EndpointDependencies, EndpointState, HttpManagementEndpoint, Shutdown};
