//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn a validated configuration into endpoint dependencies
//! - Load TLS material from disk before anything is bound
//!
//! # Design Decisions
//! - Fail fast: unreadable certificates abort startup
//! - Runtime handles and the model controller are supplied by the caller

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::admin::auth::BearerTokenAuthenticator;
use crate::config::schema::{ManagementConfig, TlsConfig};
use crate::lifecycle::endpoint::EndpointDependencies;
use crate::net::tls::{SecurityRealm, TlsContext, TlsError};

/// Build the configuration-derived part of the endpoint dependencies.
pub fn dependencies_from_config(config: &ManagementConfig) -> Result<EndpointDependencies, TlsError> {
    let http = &config.http;
    let mut deps = EndpointDependencies {
        interface: http.interface.clone(),
        secure_interface: http.secure_interface.clone(),
        port: http.port,
        secure_port: http.secure_port,
        socket_binding: http.socket_binding.clone(),
        secure_socket_binding: http.secure_socket_binding.clone(),
        shutdown_timeout: Some(Duration::from_secs(config.shutdown_timeout_secs)),
        ..EndpointDependencies::default()
    };

    if let Some(tls) = &config.tls {
        deps.tls_context = Some(load_tls(tls)?);
    }

    if let Some(realm) = &config.security_realm {
        let mut security_realm =
            SecurityRealm::new(realm.name.clone()).with_mechanisms(realm.mechanisms.iter().copied());
        if let Some(tls) = &realm.tls {
            security_realm = security_realm.with_tls(load_tls(tls)?);
        }
        deps.security_realm = Some(Arc::new(security_realm));
    }

    if let Some(token) = &config.auth.bearer_token {
        deps.authenticator = Some(Arc::new(BearerTokenAuthenticator::new(
            token.clone(),
            &config.auth.realm,
        )));
    }

    if !config.allowed_origins.is_empty() {
        deps.allowed_origins = Some(config.allowed_origins.clone());
    }

    tracing::debug!(
        tls = deps.tls_context.is_some(),
        realm = deps.security_realm.as_ref().map(|realm| realm.name.as_str()),
        authenticated = deps.authenticator.is_some(),
        "Endpoint dependencies derived from configuration"
    );
    Ok(deps)
}

fn load_tls(config: &TlsConfig) -> Result<TlsContext, TlsError> {
    let context = TlsContext::from_pem_files(Path::new(&config.cert_path), Path::new(&config.key_path))?;
    match &config.client_ca_path {
        Some(ca) => context.load_client_roots(Path::new(ca)),
        None => Ok(context),
    }
}
