//! HTTP protocol upgrade multiplexer.
//!
//! # Responsibilities
//! - Keep the set of protocols an HTTP connection may switch to
//! - Answer matching requests with `101 Switching Protocols`
//! - Hand the upgraded stream to the registered handler
//!
//! # Data Flow
//! ```text
//! GET / + Upgrade: <proto>
//!     → lookup <proto> in registry
//!     → 101 Switching Protocols
//!     → handler(upgraded stream), cancelled on server stop
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;

use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

/// An upgraded connection, usable with tokio I/O traits.
pub type UpgradedIo = TokioIo<Upgraded>;

/// Serves connections that switched to a registered protocol.
pub trait UpgradeHandler: Send + Sync {
    fn handle(&self, io: UpgradedIo) -> BoxFuture<'static, ()>;
}

impl<F, Fut> UpgradeHandler for F
where
    F: Fn(UpgradedIo) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, io: UpgradedIo) -> BoxFuture<'static, ()> {
        (self)(io).boxed()
    }
}

/// Protocol name → handler. Protocol names match case-insensitively.
#[derive(Default)]
pub struct UpgradeRegistry {
    handlers: DashMap<String, Arc<dyn UpgradeHandler>>,
}

impl std::fmt::Debug for UpgradeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl UpgradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_protocol(&self, protocol: &str, handler: impl UpgradeHandler + 'static) {
        tracing::debug!(protocol, "Upgrade protocol registered");
        self.handlers
            .insert(protocol.to_ascii_lowercase(), Arc::new(handler));
    }

    pub fn remove_protocol(&self, protocol: &str) -> bool {
        self.handlers.remove(&protocol.to_ascii_lowercase()).is_some()
    }

    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        protocols.sort();
        protocols
    }

    fn lookup(&self, request: &Request) -> Option<(String, Arc<dyn UpgradeHandler>)> {
        let offered = request.headers().get(header::UPGRADE)?.to_str().ok()?;
        offered
            .split(',')
            .map(|token| token.trim().to_ascii_lowercase())
            .find_map(|protocol| {
                let handler = self.handlers.get(&protocol)?.value().clone();
                Some((protocol, handler))
            })
    }

    /// Switch protocols if the request asks for a registered one.
    ///
    /// Hands the request back untouched when no registered protocol matches.
    pub fn try_upgrade(&self, mut request: Request, shutdown: &Shutdown) -> Result<Response, Request> {
        let Some((protocol, handler)) = self.lookup(&request) else {
            return Err(request);
        };

        let on_upgrade = hyper::upgrade::on(&mut request);
        let mut stop = shutdown.subscribe();
        let task_protocol = protocol.clone();
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    metrics::record_upgrade(&task_protocol);
                    tokio::select! {
                        _ = handler.handle(TokioIo::new(upgraded)) => {
                            tracing::debug!(protocol = %task_protocol, "Upgraded connection finished");
                        }
                        _ = stop.recv() => {
                            tracing::debug!(protocol = %task_protocol, "Upgraded connection closed by shutdown");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(protocol = %task_protocol, error = %e, "Protocol upgrade failed");
                }
            }
        });

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = response.headers_mut();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        if let Ok(value) = HeaderValue::from_str(&protocol) {
            headers.insert(header::UPGRADE, value);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_upgrade(value: &str) -> Request {
        Request::builder()
            .uri("/")
            .header(header::UPGRADE, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn protocols_are_case_insensitive() {
        let registry = UpgradeRegistry::new();
        registry.add_protocol("JBoss-Remoting", |_io: UpgradedIo| async {});
        assert_eq!(registry.protocols(), vec!["jboss-remoting".to_string()]);
        assert!(registry.lookup(&request_with_upgrade("jboss-remoting")).is_some());
        assert!(registry.remove_protocol("JBOSS-REMOTING"));
        assert!(registry.protocols().is_empty());
    }

    #[test]
    fn picks_first_registered_offer() {
        let registry = UpgradeRegistry::new();
        registry.add_protocol("jboss-remoting", |_io: UpgradedIo| async {});
        let (protocol, _) = registry
            .lookup(&request_with_upgrade("h2c, jboss-remoting"))
            .unwrap();
        assert_eq!(protocol, "jboss-remoting");
    }

    #[tokio::test]
    async fn unknown_protocol_falls_through() {
        let registry = UpgradeRegistry::new();
        let shutdown = Shutdown::new();
        let request = request_with_upgrade("websocket");
        assert!(registry.try_upgrade(request, &shutdown).is_err());
    }
}
