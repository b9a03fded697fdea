//! Lifecycle of the HTTP management endpoint.
//!
//! # States
//! - Stopped: nothing bound, nothing registered
//! - Starting: resolving bindings, binding sockets
//! - Started: serving; managed bindings registered
//! - Stopping: unpublishing, stopping the server, unregistering
//! - Failed: a start failed and is being rolled back. Only ever set while
//!   the start lock is held, so `state()` reports it as Stopped; the
//!   transition is visible as a `state = Failed` log event
//!
//! # State Transitions
//! ```text
//! Stopped → Starting → Started
//! Starting → Failed → Stopped   (bind conflict or construction error)
//! Started → Stopping → Stopped
//! ```
//!
//! # Design Decisions
//! - Start and stop hold one lock for their whole duration
//! - The resolution mode chosen at start is the one used at stop
//! - Listener directory entries added before a failed start stay published
//!   until the next stop of a started endpoint

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::admin::auth::HttpAuthenticator;
use crate::controller::{ModelController, ProcessStateService};
use crate::error::EndpointError;
use crate::http::console::ConsoleMode;
use crate::http::contexts::PathRemapper;
use crate::http::server::ManagementHttpServer;
use crate::http::upgrade::UpgradeRegistry;
use crate::lifecycle::services::{
    ServiceRegistry, HTTPS_UPGRADE_SERVICE_NAME, HTTP_UPGRADE_SERVICE_NAME,
};
use crate::net::binding::{
    self, BindingInputs, NetworkInterfaceBinding, ResolutionMode, ResolvedBindings, SocketBinding,
};
use crate::net::listener::{self, ListenerDirectory};
use crate::net::registry::{ManagedBinding, SocketBindingManager};
use crate::net::tls::{SecurityPolicy, SecurityRealm, TlsContext};
use crate::observability::metrics;

/// Managed binding name of the plain socket in unmanaged mode.
pub const UNMANAGED_HTTP_BINDING: &str = "management-http";
/// Managed binding name of the secure socket in unmanaged mode.
pub const UNMANAGED_HTTPS_BINDING: &str = "management-https";

/// Lifecycle state of the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Stopped,
    Starting,
    Started,
    Stopping,
    Failed,
}

/// Every collaborator the endpoint needs, supplied before `start`.
#[derive(Clone, Default)]
pub struct EndpointDependencies {
    pub model_controller: Option<Arc<dyn ModelController>>,
    pub process_state: Option<Arc<ProcessStateService>>,
    pub socket_binding_manager: Option<Arc<SocketBindingManager>>,
    pub interface: Option<NetworkInterfaceBinding>,
    pub secure_interface: Option<NetworkInterfaceBinding>,
    pub port: Option<i32>,
    pub secure_port: Option<i32>,
    pub socket_binding: Option<SocketBinding>,
    pub secure_socket_binding: Option<SocketBinding>,
    pub security_realm: Option<Arc<SecurityRealm>>,
    pub tls_context: Option<TlsContext>,
    pub authenticator: Option<Arc<dyn HttpAuthenticator>>,
    pub listener_directory: Option<Arc<ListenerDirectory>>,
    pub service_registry: Option<Arc<ServiceRegistry>>,
    pub allowed_origins: Option<Vec<String>>,
    pub worker: Option<Handle>,
    pub executor: Option<Handle>,
    pub shutdown_timeout: Option<Duration>,
}

impl EndpointDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model_controller(mut self, controller: Arc<dyn ModelController>) -> Self {
        self.model_controller = Some(controller);
        self
    }

    pub fn with_process_state(mut self, process_state: Arc<ProcessStateService>) -> Self {
        self.process_state = Some(process_state);
        self
    }

    pub fn with_socket_binding_manager(mut self, manager: Arc<SocketBindingManager>) -> Self {
        self.socket_binding_manager = Some(manager);
        self
    }

    pub fn with_interface(mut self, interface: NetworkInterfaceBinding) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn with_secure_interface(mut self, interface: NetworkInterfaceBinding) -> Self {
        self.secure_interface = Some(interface);
        self
    }

    pub fn with_port(mut self, port: i32) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_secure_port(mut self, port: i32) -> Self {
        self.secure_port = Some(port);
        self
    }

    pub fn with_socket_binding(mut self, binding: SocketBinding) -> Self {
        self.socket_binding = Some(binding);
        self
    }

    pub fn with_secure_socket_binding(mut self, binding: SocketBinding) -> Self {
        self.secure_socket_binding = Some(binding);
        self
    }

    pub fn with_security_realm(mut self, realm: Arc<SecurityRealm>) -> Self {
        self.security_realm = Some(realm);
        self
    }

    pub fn with_tls_context(mut self, tls: TlsContext) -> Self {
        self.tls_context = Some(tls);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn HttpAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_listener_directory(mut self, directory: Arc<ListenerDirectory>) -> Self {
        self.listener_directory = Some(directory);
        self
    }

    pub fn with_service_registry(mut self, registry: Arc<ServiceRegistry>) -> Self {
        self.service_registry = Some(registry);
        self
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    pub fn with_worker(mut self, worker: Handle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_executor(mut self, executor: Handle) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    fn binding_inputs(&self) -> BindingInputs {
        BindingInputs {
            interface: self.interface.clone(),
            secure_interface: self.secure_interface.clone(),
            port: self.port,
            secure_port: self.secure_port,
            socket_binding: self.socket_binding.clone(),
            secure_socket_binding: self.secure_socket_binding.clone(),
        }
    }
}

/// Resources owned by one start/stop cycle.
struct Cycle {
    mode: ResolutionMode,
    server: ManagementHttpServer,
    upgrades: Arc<UpgradeRegistry>,
    bindings: Vec<ManagedBinding>,
}

struct Inner {
    state: EndpointState,
    cycle: Option<Cycle>,
}

/// The HTTP management endpoint.
pub struct HttpManagementEndpoint {
    console_mode: ConsoleMode,
    console_slot: Option<String>,
    deps: EndpointDependencies,
    inner: Mutex<Inner>,
}

impl HttpManagementEndpoint {
    pub fn new(
        console_mode: ConsoleMode,
        console_slot: Option<String>,
        deps: EndpointDependencies,
    ) -> Self {
        Self {
            console_mode,
            console_slot,
            deps,
            inner: Mutex::new(Inner {
                state: EndpointState::Stopped,
                cycle: None,
            }),
        }
    }

    /// Start the endpoint. Starting a started endpoint does nothing.
    pub async fn start(&self) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock().await;
        if inner.state == EndpointState::Started {
            tracing::debug!("Management endpoint already started");
            return Ok(());
        }

        inner.state = EndpointState::Starting;
        match self.start_cycle().await {
            Ok(cycle) => {
                tracing::info!(
                    mode = %cycle.mode,
                    http = ?cycle.server.local_address(),
                    https = ?cycle.server.secure_local_address(),
                    "Management endpoint started"
                );
                inner.cycle = Some(cycle);
                inner.state = EndpointState::Started;
                metrics::record_start("success");
                Ok(())
            }
            Err(e) => {
                inner.state = EndpointState::Failed;
                tracing::error!(state = ?inner.state, error = %e, "Management endpoint failed to start");
                inner.state = EndpointState::Stopped;
                tracing::debug!(state = ?inner.state, "Failed start rolled back");
                metrics::record_start(if matches!(e, EndpointError::BindConflict { .. }) {
                    "bind-conflict"
                } else {
                    "failure"
                });
                Err(e)
            }
        }
    }

    async fn start_cycle(&self) -> Result<Cycle, EndpointError> {
        let controller = self
            .deps
            .model_controller
            .clone()
            .ok_or(EndpointError::MissingRequiredDependency("model controller"))?;
        let worker = self
            .deps
            .worker
            .clone()
            .ok_or(EndpointError::MissingRequiredDependency("worker"))?;
        let executor = self
            .deps
            .executor
            .clone()
            .ok_or(EndpointError::MissingRequiredDependency("management executor"))?;

        let resolved = binding::resolve(&self.deps.binding_inputs());
        tracing::debug!(
            mode = %resolved.mode,
            attempted = ?resolved.attempted(),
            "Management bindings resolved"
        );

        let policy = SecurityPolicy::select(
            self.deps.tls_context.as_ref(),
            self.deps.security_realm.as_deref(),
        );

        let listeners = listener::build_listeners(resolved.plain.as_ref(), resolved.secure.as_ref());
        listener::publish(&listeners, self.deps.listener_directory.as_deref());

        let upgrades = Arc::new(UpgradeRegistry::new());
        if let Some(services) = &self.deps.service_registry {
            services.install(
                HTTP_UPGRADE_SERVICE_NAME,
                upgrades.clone(),
                &[HTTPS_UPGRADE_SERVICE_NAME],
            );
        }

        let mut builder = ManagementHttpServer::builder()
            .bind_address(resolved.plain.as_ref().map(|spec| spec.address))
            .secure_bind_address(resolved.secure.as_ref().map(|spec| spec.address))
            .model_controller(controller)
            .process_state(self.deps.process_state.clone())
            .security_policy(policy)
            .authenticator(self.deps.authenticator.clone())
            .console(self.console_mode, self.console_slot.clone())
            .upgrade_registry(upgrades.clone())
            .allowed_origins(self.deps.allowed_origins.clone())
            .worker(worker)
            .executor(executor);
        if let Some(timeout) = self.deps.shutdown_timeout {
            builder = builder.shutdown_timeout(timeout);
        }

        let mut server = match builder.build() {
            Ok(server) => server,
            Err(e) => {
                self.remove_upgrade_service();
                return Err(e);
            }
        };
        if let Err(e) = server.start() {
            if let Err(stop_error) = server.stop().await {
                tracing::warn!(error = %stop_error, "Rollback of a failed start did not stop cleanly");
            }
            self.remove_upgrade_service();
            return Err(e);
        }

        let bindings = self.register_bindings(&resolved, &server);
        Ok(Cycle {
            mode: resolved.mode,
            server,
            upgrades,
            bindings,
        })
    }

    /// Record every socket the server actually bound as a managed binding.
    fn register_bindings(
        &self,
        resolved: &ResolvedBindings,
        server: &ManagementHttpServer,
    ) -> Vec<ManagedBinding> {
        let Some(manager) = &self.deps.socket_binding_manager else {
            return Vec::new();
        };
        let registry = manager.registry_for(resolved.mode);

        let plain = resolved.plain.as_ref().zip(server.local_address());
        let secure = resolved.secure.as_ref().zip(server.secure_local_address());
        let candidates = [
            plain.map(|(spec, bound)| (spec, bound, UNMANAGED_HTTP_BINDING)),
            secure.map(|(spec, bound)| (spec, bound, UNMANAGED_HTTPS_BINDING)),
        ];

        candidates
            .into_iter()
            .flatten()
            .map(|(spec, bound, unmanaged_name)| {
                let name = match resolved.mode {
                    ResolutionMode::Unmanaged => unmanaged_name.to_string(),
                    ResolutionMode::Managed => spec
                        .source_name
                        .clone()
                        .unwrap_or_else(|| unmanaged_name.to_string()),
                };
                let binding = ManagedBinding::new(name, bound);
                registry.register(binding.clone());
                binding
            })
            .collect()
    }

    fn remove_upgrade_service(&self) {
        if let Some(services) = &self.deps.service_registry {
            services.remove(HTTP_UPGRADE_SERVICE_NAME, &[HTTPS_UPGRADE_SERVICE_NAME]);
        }
    }

    /// Stop the endpoint. Stopping a stopped endpoint does nothing.
    ///
    /// Local state is always reset; a failure of the underlying server stop is
    /// returned afterwards.
    pub async fn stop(&self) -> Result<(), EndpointError> {
        let mut inner = self.inner.lock().await;
        let Some(mut cycle) = inner.cycle.take() else {
            tracing::debug!("Management endpoint not running, nothing to stop");
            inner.state = EndpointState::Stopped;
            return Ok(());
        };

        inner.state = EndpointState::Stopping;
        listener::unpublish(self.deps.listener_directory.as_deref());

        let result = cycle.server.stop().await;

        if let Some(manager) = &self.deps.socket_binding_manager {
            let registry = manager.registry_for(cycle.mode);
            for binding in &cycle.bindings {
                registry.unregister(binding);
            }
        }
        self.remove_upgrade_service();
        inner.state = EndpointState::Stopped;
        metrics::record_stop();

        match &result {
            Ok(()) => tracing::info!(mode = %cycle.mode, "Management endpoint stopped"),
            Err(e) => tracing::warn!(error = %e, "Management endpoint stopped with errors"),
        }
        result
    }

    pub async fn state(&self) -> EndpointState {
        self.inner.lock().await.state
    }

    /// Resolution mode of the running cycle.
    pub async fn resolution_mode(&self) -> Option<ResolutionMode> {
        self.inner.lock().await.cycle.as_ref().map(|cycle| cycle.mode)
    }

    /// Bound plain address, once started.
    pub async fn http_socket_address(&self) -> Option<SocketAddr> {
        let inner = self.inner.lock().await;
        inner.cycle.as_ref().and_then(|cycle| cycle.server.local_address())
    }

    /// Bound secure address, once started.
    pub async fn https_socket_address(&self) -> Option<SocketAddr> {
        let inner = self.inner.lock().await;
        inner.cycle.as_ref().and_then(|cycle| cycle.server.secure_local_address())
    }

    /// Effective HTTP port: the bound port, else the configured one, else -1.
    pub async fn http_port(&self) -> i32 {
        match self.http_socket_address().await {
            Some(address) => i32::from(address.port()),
            None => configured_port(binding::resolve(&self.deps.binding_inputs()).plain),
        }
    }

    /// Effective HTTPS port: the bound port, else the configured one, else -1.
    pub async fn https_port(&self) -> i32 {
        match self.https_socket_address().await {
            Some(address) => i32::from(address.port()),
            None => configured_port(binding::resolve(&self.deps.binding_inputs()).secure),
        }
    }

    /// Interface the plain socket is configured on.
    pub fn http_interface(&self) -> Option<NetworkInterfaceBinding> {
        self.deps.interface.clone().or_else(|| {
            self.deps
                .socket_binding
                .as_ref()
                .map(|binding| binding.interface.clone())
        })
    }

    /// Interface the secure socket is configured on.
    pub fn https_interface(&self) -> Option<NetworkInterfaceBinding> {
        match &self.deps.interface {
            Some(interface) => Some(self.deps.secure_interface.clone().unwrap_or_else(|| interface.clone())),
            None => self
                .deps
                .secure_socket_binding
                .as_ref()
                .map(|binding| binding.interface.clone()),
        }
    }

    pub fn has_console(&self) -> bool {
        self.console_mode.has_console()
    }

    pub fn console_mode(&self) -> ConsoleMode {
        self.console_mode
    }

    pub fn console_slot(&self) -> Option<&str> {
        self.console_slot.as_deref()
    }

    /// Upgrade multiplexer of the running cycle.
    pub async fn upgrade_registry(&self) -> Option<Arc<UpgradeRegistry>> {
        let inner = self.inner.lock().await;
        inner.cycle.as_ref().map(|cycle| cycle.upgrades.clone())
    }

    /// Serve files from `directory` under `/<name>`.
    pub async fn add_static_context(&self, name: &str, directory: PathBuf) -> Result<(), EndpointError> {
        let inner = self.inner.lock().await;
        let cycle = inner.cycle.as_ref().ok_or(EndpointError::NotRunning)?;
        cycle.server.add_static_context(name, directory);
        Ok(())
    }

    /// Remap GET requests under `/<name>` onto management reads.
    pub async fn add_get_remap_context(
        &self,
        name: &str,
        remapper: Arc<dyn PathRemapper>,
    ) -> Result<(), EndpointError> {
        let inner = self.inner.lock().await;
        let cycle = inner.cycle.as_ref().ok_or(EndpointError::NotRunning)?;
        cycle.server.add_get_remap_context(name, remapper);
        Ok(())
    }

    /// Remove a context. Returns whether one was mounted under `name`.
    pub async fn remove_context(&self, name: &str) -> Result<bool, EndpointError> {
        let inner = self.inner.lock().await;
        let cycle = inner.cycle.as_ref().ok_or(EndpointError::NotRunning)?;
        Ok(cycle.server.remove_context(name))
    }
}

fn configured_port(spec: Option<binding::BindingSpec>) -> i32 {
    spec.map(|spec| spec.address.port())
        .filter(|port| *port > 0)
        .map(i32::from)
        .unwrap_or(-1)
}
