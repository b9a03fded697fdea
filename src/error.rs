//! Error types for the management endpoint.

use std::net::SocketAddr;
use thiserror::Error;

use crate::net::tls::TlsError;

/// Errors surfaced by the endpoint lifecycle and its management facade.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// A port the endpoint tried to bind is already in use.
    ///
    /// `attempted` lists every address the start cycle tried, plain first.
    #[error("{message}{}", format_attempted(.attempted))]
    BindConflict {
        message: String,
        attempted: Vec<SocketAddr>,
    },

    /// A required collaborator was never supplied.
    #[error("Missing required dependency: {0}")]
    MissingRequiredDependency(&'static str),

    /// Any other failure while building or starting the embedded server.
    #[error("Failed to start the http management service: {0}")]
    StartFailure(String),

    /// The embedded server did not stop cleanly. Local state was reset anyway.
    #[error("Failed to stop the http management service: {0}")]
    StopFailure(String),

    /// The operation needs a started endpoint.
    #[error("The http management service is not running")]
    NotRunning,

    /// TLS material could not be turned into a server configuration.
    #[error(transparent)]
    Tls(#[from] TlsError),
}

fn format_attempted(attempted: &[SocketAddr]) -> String {
    attempted.iter().map(|addr| format!(" {}", addr)).collect()
}

impl EndpointError {
    /// True for the failures that roll the endpoint back to `Stopped`.
    pub fn is_start_failure(&self) -> bool {
        matches!(
            self,
            EndpointError::BindConflict { .. }
                | EndpointError::StartFailure(_)
                | EndpointError::Tls(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_conflict_lists_every_attempted_address() {
        let err = EndpointError::BindConflict {
            message: "Address already in use".to_string(),
            attempted: vec![
                "10.0.0.5:9990".parse().unwrap(),
                "10.0.0.5:9993".parse().unwrap(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Address already in use 10.0.0.5:9990 10.0.0.5:9993"
        );
        assert!(err.is_start_failure());
    }

    #[test]
    fn not_running_is_not_a_start_failure() {
        assert!(!EndpointError::NotRunning.is_start_failure());
    }
}
