//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ports, timeouts)
//! - Check that at least one socket is configured
//! - Detect duplicate binding names and malformed origins
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagementConfig → Result<(), Vec<ValidationError>>

use std::fmt;

use url::Url;

use crate::config::schema::ManagementConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ManagementConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let http = &config.http;

    for (field, port) in [("http.port", http.port), ("http.secure_port", http.secure_port)] {
        if let Some(port) = port {
            if port > i32::from(u16::MAX) {
                errors.push(ValidationError::new(field, format!("port {} exceeds 65535", port)));
            }
        }
    }

    let unmanaged = http.interface.is_some();
    let has_unmanaged_port = [http.port, http.secure_port]
        .iter()
        .flatten()
        .any(|port| *port > 0 && *port <= i32::from(u16::MAX));
    let has_managed_binding = http.socket_binding.is_some() || http.secure_socket_binding.is_some();

    if unmanaged && !has_unmanaged_port {
        errors.push(ValidationError::new(
            "http",
            "an interface is configured without a port for either protocol",
        ));
    } else if !unmanaged && !has_managed_binding {
        errors.push(ValidationError::new(
            "http",
            "neither an interface nor a socket binding is configured",
        ));
    }

    if !unmanaged {
        if let (Some(plain), Some(secure)) = (&http.socket_binding, &http.secure_socket_binding) {
            if plain.name == secure.name {
                errors.push(ValidationError::new(
                    "http.secure_socket_binding",
                    format!("duplicate socket binding name '{}'", secure.name),
                ));
            }
        }
    }

    for origin in &config.allowed_origins {
        match Url::parse(origin) {
            Ok(url) if url.has_host() => {}
            _ => errors.push(ValidationError::new(
                "allowed_origins",
                format!("'{}' is not a valid origin", origin),
            )),
        }
    }

    if let Some(realm) = &config.security_realm {
        if realm.name.trim().is_empty() {
            errors.push(ValidationError::new("security_realm.name", "must not be empty"));
        }
    }

    if config.auth.bearer_token.as_deref().is_some_and(|token| token.is_empty()) {
        errors.push(ValidationError::new("auth.bearer_token", "must not be empty"));
    }

    if config.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new("shutdown_timeout_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
