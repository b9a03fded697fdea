//! Embedded management HTTP server.
//!
//! # Responsibilities
//! - Assemble the Axum router (management API, console, upgrades, contexts)
//! - Wire up middleware (tracing, CORS for allowed origins)
//! - Bind the plain and secure sockets synchronously so bind errors surface
//!   from `start`
//! - Serve on the worker runtime and stop gracefully through a shared handle

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;

use axum::{http::HeaderValue, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle as ServerHandle;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::admin::{auth::HttpAuthenticator, setup_management_router, setup_root_router};
use crate::controller::{ModelController, ProcessStateService};
use crate::error::EndpointError;
use crate::http::console::ConsoleMode;
use crate::http::contexts::{ContextTable, ManagementContext, PathRemapper};
use crate::http::upgrade::UpgradeRegistry;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::tls::SecurityPolicy;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Console settings handed to the handlers.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSettings {
    pub mode: ConsoleMode,
    pub slot: Option<String>,
}

/// State shared by every management handler.
#[derive(Clone)]
pub struct ManagementState {
    pub controller: Arc<dyn ModelController>,
    pub executor: Handle,
    pub process_state: Option<Arc<ProcessStateService>>,
    pub authenticator: Option<Arc<dyn HttpAuthenticator>>,
    pub contexts: Arc<ContextTable>,
    pub upgrades: Arc<UpgradeRegistry>,
    pub console: ConsoleSettings,
    pub shutdown: Arc<Shutdown>,
}

/// Builder for [`ManagementHttpServer`].
#[derive(Default)]
pub struct ServerBuilder {
    bind_address: Option<SocketAddr>,
    secure_bind_address: Option<SocketAddr>,
    controller: Option<Arc<dyn ModelController>>,
    process_state: Option<Arc<ProcessStateService>>,
    policy: SecurityPolicy,
    authenticator: Option<Arc<dyn HttpAuthenticator>>,
    console: ConsoleSettings,
    upgrades: Option<Arc<UpgradeRegistry>>,
    allowed_origins: Option<Vec<String>>,
    worker: Option<Handle>,
    executor: Option<Handle>,
    shutdown_timeout: Option<Duration>,
}

impl ServerBuilder {
    pub fn bind_address(mut self, address: Option<SocketAddr>) -> Self {
        self.bind_address = address;
        self
    }

    pub fn secure_bind_address(mut self, address: Option<SocketAddr>) -> Self {
        self.secure_bind_address = address;
        self
    }

    pub fn model_controller(mut self, controller: Arc<dyn ModelController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn process_state(mut self, process_state: Option<Arc<ProcessStateService>>) -> Self {
        self.process_state = process_state;
        self
    }

    pub fn security_policy(mut self, policy: SecurityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn authenticator(mut self, authenticator: Option<Arc<dyn HttpAuthenticator>>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn console(mut self, mode: ConsoleMode, slot: Option<String>) -> Self {
        self.console = ConsoleSettings { mode, slot };
        self
    }

    pub fn upgrade_registry(mut self, upgrades: Arc<UpgradeRegistry>) -> Self {
        self.upgrades = Some(upgrades);
        self
    }

    pub fn allowed_origins(mut self, origins: Option<Vec<String>>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn worker(mut self, worker: Handle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Validate the collected settings and assemble the server.
    pub fn build(self) -> Result<ManagementHttpServer, EndpointError> {
        let controller = self
            .controller
            .ok_or(EndpointError::MissingRequiredDependency("model controller"))?;
        let worker = self
            .worker
            .ok_or(EndpointError::MissingRequiredDependency("worker"))?;
        let executor = self
            .executor
            .ok_or(EndpointError::MissingRequiredDependency("management executor"))?;

        let tls = match self.secure_bind_address {
            Some(address) => {
                let context = self.policy.tls.as_ref().ok_or_else(|| {
                    EndpointError::StartFailure(format!(
                        "secure address {} configured without a TLS context",
                        address
                    ))
                })?;
                Some(context.rustls_config(self.policy.client_auth)?)
            }
            None => None,
        };

        let shutdown = Arc::new(Shutdown::new());
        let contexts = Arc::new(ContextTable::new());
        let state = ManagementState {
            controller,
            executor,
            process_state: self.process_state,
            authenticator: self.authenticator,
            contexts: contexts.clone(),
            upgrades: self.upgrades.unwrap_or_default(),
            console: self.console,
            shutdown: shutdown.clone(),
        };
        let router = build_router(state, self.allowed_origins.as_deref());

        Ok(ManagementHttpServer {
            router,
            bind_address: self.bind_address,
            secure_bind_address: self.secure_bind_address,
            tls,
            worker,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            handle: ServerHandle::new(),
            tasks: Vec::new(),
            local_address: None,
            secure_local_address: None,
            contexts,
            shutdown,
        })
    }
}

fn build_router(state: ManagementState, allowed_origins: Option<&[String]>) -> Router {
    let router = setup_root_router(state.clone())
        .merge(setup_management_router(state))
        .layer(TraceLayer::new_for_http());

    match allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(%origin, "Ignoring invalid allowed origin");
                        None
                    }
                })
                .collect();
            router.layer(CorsLayer::new().allow_origin(AllowOrigin::list(origins)))
        }
        _ => router,
    }
}

/// The embedded server: one router served on up to two sockets.
pub struct ManagementHttpServer {
    router: Router,
    bind_address: Option<SocketAddr>,
    secure_bind_address: Option<SocketAddr>,
    tls: Option<RustlsConfig>,
    worker: Handle,
    shutdown_timeout: Duration,
    handle: ServerHandle,
    tasks: Vec<JoinHandle<io::Result<()>>>,
    local_address: Option<SocketAddr>,
    secure_local_address: Option<SocketAddr>,
    contexts: Arc<ContextTable>,
    shutdown: Arc<Shutdown>,
}

impl ManagementHttpServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Bind every configured socket, then start serving.
    ///
    /// Both sockets are bound before anything is served; on a bind failure
    /// the sockets already bound are released.
    pub fn start(&mut self) -> Result<(), EndpointError> {
        let attempted: Vec<SocketAddr> = self
            .bind_address
            .iter()
            .chain(self.secure_bind_address.iter())
            .copied()
            .collect();

        let plain = self
            .bind_address
            .map(|address| bind(address, &attempted))
            .transpose()?;
        let secure = self
            .secure_bind_address
            .map(|address| bind(address, &attempted))
            .transpose()?;

        if let Some(listener) = plain {
            let local = local_address(&listener)?;
            let server = axum_server::from_tcp(listener)
                .handle(self.handle.clone())
                .serve(self.router.clone().into_make_service_with_connect_info::<SocketAddr>());
            self.tasks.push(self.worker.spawn(server));
            self.local_address = Some(local);
            tracing::info!(address = %local, "Management HTTP listener started");
        }

        if let (Some(listener), Some(tls)) = (secure, self.tls.clone()) {
            let local = local_address(&listener)?;
            let server = axum_server::tls_rustls::from_tcp_rustls(listener, tls)
                .handle(self.handle.clone())
                .serve(self.router.clone().into_make_service_with_connect_info::<SocketAddr>());
            self.tasks.push(self.worker.spawn(server));
            self.secure_local_address = Some(local);
            tracing::info!(address = %local, "Management HTTPS listener started");
        }

        Ok(())
    }

    /// Stop serving and wait for the server tasks to finish.
    pub async fn stop(&mut self) -> Result<(), EndpointError> {
        self.shutdown.trigger();
        self.handle.graceful_shutdown(Some(self.shutdown_timeout));

        let mut failure = None;
        let deadline = self.shutdown_timeout + Duration::from_secs(1);
        for mut task in self.tasks.drain(..) {
            let outcome = match tokio::time::timeout(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => continue,
                Ok(Ok(Err(e))) => format!("server task failed: {}", e),
                Ok(Err(e)) => format!("server task aborted: {}", e),
                Err(_) => {
                    // Dropping the handle would detach the task with its socket still bound.
                    task.abort();
                    format!("server task did not stop within {:?}", deadline)
                }
            };
            tracing::warn!(error = %outcome, "Management server did not stop cleanly");
            failure.get_or_insert(outcome);
        }

        self.local_address = None;
        self.secure_local_address = None;
        match failure {
            Some(message) => Err(EndpointError::StopFailure(message)),
            None => Ok(()),
        }
    }

    /// Address the plain socket is bound to, once started.
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    /// Address the secure socket is bound to, once started.
    pub fn secure_local_address(&self) -> Option<SocketAddr> {
        self.secure_local_address
    }

    pub fn add_static_context(&self, name: &str, directory: std::path::PathBuf) {
        self.contexts.add(name, ManagementContext::Static(directory));
    }

    pub fn add_get_remap_context(&self, name: &str, remapper: Arc<dyn PathRemapper>) {
        self.contexts.add(name, ManagementContext::GetRemap(remapper));
    }

    pub fn remove_context(&self, name: &str) -> bool {
        self.contexts.remove(name)
    }
}

fn bind(address: SocketAddr, attempted: &[SocketAddr]) -> Result<TcpListener, EndpointError> {
    let listener = TcpListener::bind(address).map_err(|e| match e.kind() {
        io::ErrorKind::AddrInUse => EndpointError::BindConflict {
            message: e.to_string(),
            attempted: attempted.to_vec(),
        },
        _ => EndpointError::StartFailure(format!("failed to bind {}: {}", address, e)),
    })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| EndpointError::StartFailure(format!("failed to configure {}: {}", address, e)))?;
    Ok(listener)
}

fn local_address(listener: &TcpListener) -> Result<SocketAddr, EndpointError> {
    listener
        .local_addr()
        .map_err(|e| EndpointError::StartFailure(format!("failed to read bound address: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InMemoryModelController;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn server() -> ManagementHttpServer {
        ManagementHttpServer::builder()
            .model_controller(Arc::new(InMemoryModelController::default()))
            .worker(Handle::current())
            .executor(Handle::current())
            .shutdown_timeout(Duration::ZERO)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn build_requires_worker_and_executor() {
        let err = ManagementHttpServer::builder()
            .model_controller(Arc::new(InMemoryModelController::default()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, EndpointError::MissingRequiredDependency("worker")));
    }

    #[tokio::test]
    async fn secure_address_without_tls_is_rejected() {
        let err = ManagementHttpServer::builder()
            .model_controller(Arc::new(InMemoryModelController::default()))
            .worker(Handle::current())
            .executor(Handle::current())
            .secure_bind_address(Some("127.0.0.1:0".parse().unwrap()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, EndpointError::StartFailure(_)));
    }

    #[tokio::test]
    async fn stuck_task_is_aborted_on_stop() {
        let mut server = server();
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        server.tasks.push(tokio::spawn(async move {
            let _flag = flag;
            std::future::pending::<()>().await;
            Ok(())
        }));

        let err = server.stop().await.unwrap_err();
        assert!(matches!(err, EndpointError::StopFailure(_)));
        assert!(server.tasks.is_empty());

        for _ in 0..50 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped.load(Ordering::SeqCst));
    }
}
