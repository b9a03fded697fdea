//! Start/stop behavior of the management endpoint against real loopback sockets.

use std::sync::Arc;

use mgmt_endpoint::http::{ConsoleMode, UpgradeRegistry};
use mgmt_endpoint::lifecycle::services::{HTTPS_UPGRADE_SERVICE_NAME, HTTP_UPGRADE_SERVICE_NAME};
use mgmt_endpoint::net::listener::{HTTPS_MANAGEMENT, HTTP_MANAGEMENT};
use mgmt_endpoint::net::{ResolutionMode, SocketBinding};
use mgmt_endpoint::{EndpointError, EndpointState, HttpManagementEndpoint};

mod common;

use common::Fixture;

#[tokio::test]
async fn test_unmanaged_http_only() {
    let fixture = Fixture::new();
    let port = common::free_port();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(port)),
    );

    endpoint.start().await.unwrap();

    assert_eq!(endpoint.state().await, EndpointState::Started);
    assert_eq!(endpoint.resolution_mode().await, Some(ResolutionMode::Unmanaged));
    assert_eq!(endpoint.http_port().await, i32::from(port));
    assert_eq!(endpoint.https_port().await, -1);
    assert_eq!(fixture.listeners.names(), vec![HTTP_MANAGEMENT.to_string()]);

    let unnamed = fixture.bindings.unnamed_registry();
    assert_eq!(unnamed.len(), 1);
    assert_eq!(
        unnamed.get("management-http").unwrap().bound_address.port(),
        port
    );
    assert!(fixture.bindings.named_registry().is_empty());

    endpoint.stop().await.unwrap();

    assert_eq!(endpoint.state().await, EndpointState::Stopped);
    assert!(unnamed.is_empty());
    assert!(fixture.listeners.is_empty());
    assert!(endpoint.http_socket_address().await.is_none());
}

#[tokio::test]
async fn test_bind_conflict_rolls_back() {
    let fixture = Fixture::new();
    let (_held, taken) = common::occupy_port();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(taken.port())),
    );

    let err = endpoint.start().await.unwrap_err();

    match &err {
        EndpointError::BindConflict { attempted, .. } => assert_eq!(attempted, &vec![taken]),
        other => panic!("expected a bind conflict, got {other:?}"),
    }
    assert!(err.to_string().contains(&taken.to_string()));
    assert!(err.is_start_failure());
    assert_eq!(endpoint.state().await, EndpointState::Stopped);
    assert!(fixture.bindings.unnamed_registry().is_empty());
    assert!(fixture.bindings.named_registry().is_empty());
    assert!(!fixture.services.contains(HTTP_UPGRADE_SERVICE_NAME));
}

#[tokio::test]
async fn test_secure_bind_conflict_reports_both_addresses() {
    let fixture = Fixture::new();
    let plain_port = common::free_port();
    let (_held, taken) = common::occupy_port();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(plain_port))
            .with_secure_port(i32::from(taken.port()))
            .with_tls_context(common::self_signed_tls()),
    );

    let err = endpoint.start().await.unwrap_err();

    let EndpointError::BindConflict { attempted, .. } = &err else {
        panic!("expected a bind conflict, got {err:?}");
    };
    assert_eq!(attempted.len(), 2);
    assert_eq!(attempted[1], taken);
    assert!(fixture.bindings.unnamed_registry().is_empty());

    // The plain socket bound before the conflict was released.
    std::net::TcpListener::bind(("127.0.0.1", plain_port)).unwrap();
}

#[tokio::test]
async fn test_stop_twice_is_idempotent() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(common::free_port())),
    );
    endpoint.start().await.unwrap();

    endpoint.stop().await.unwrap();
    let after_first = (
        endpoint.state().await,
        fixture.bindings.unnamed_registry().len(),
        fixture.listeners.len(),
    );
    endpoint.stop().await.unwrap();
    let after_second = (
        endpoint.state().await,
        fixture.bindings.unnamed_registry().len(),
        fixture.listeners.len(),
    );

    assert_eq!(after_first, (EndpointState::Stopped, 0, 0));
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn test_managed_binding_round_trip() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_socket_binding(SocketBinding::new("mgmt-http", common::loopback(), 0)),
    );

    endpoint.start().await.unwrap();

    let named = fixture.bindings.named_registry();
    assert_eq!(named.len(), 1);
    let entry = named.get("mgmt-http").unwrap();
    assert_eq!(Some(entry.bound_address), endpoint.http_socket_address().await);
    assert_ne!(entry.bound_address.port(), 0);

    let listener = fixture.listeners.get(HTTP_MANAGEMENT).unwrap();
    assert_eq!(listener.socket_binding.as_deref(), Some("mgmt-http"));

    endpoint.stop().await.unwrap();
    assert!(!named.contains("mgmt-http"));
}

#[tokio::test]
async fn test_managed_plain_and_secure() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_socket_binding(SocketBinding::new("mgmt", common::loopback(), 0))
            .with_secure_socket_binding(SocketBinding::new("mgmt-ssl", common::loopback(), 0))
            .with_tls_context(common::self_signed_tls()),
    );

    endpoint.start().await.unwrap();

    let mut names = fixture.listeners.names();
    names.sort();
    assert_eq!(names, vec![HTTP_MANAGEMENT.to_string(), HTTPS_MANAGEMENT.to_string()]);

    let named = fixture.bindings.named_registry();
    assert!(named.contains("mgmt"));
    assert!(named.contains("mgmt-ssl"));
    assert!(fixture.bindings.unnamed_registry().is_empty());
    assert!(endpoint.https_port().await > 0);
    assert_ne!(endpoint.http_port().await, endpoint.https_port().await);

    endpoint.stop().await.unwrap();
    assert!(named.is_empty());
}

#[tokio::test]
async fn test_unmanaged_interface_wins_over_socket_bindings() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(common::free_port()))
            .with_socket_binding(SocketBinding::new("mgmt", common::loopback(), 0)),
    );

    endpoint.start().await.unwrap();

    assert_eq!(endpoint.resolution_mode().await, Some(ResolutionMode::Unmanaged));
    assert!(fixture.bindings.named_registry().is_empty());
    assert!(fixture.bindings.unnamed_registry().contains("management-http"));

    endpoint.stop().await.unwrap();
}

#[tokio::test]
async fn test_non_positive_secure_port_publishes_no_https_listener() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(common::free_port()))
            .with_secure_port(0)
            .with_tls_context(common::self_signed_tls()),
    );

    endpoint.start().await.unwrap();

    assert!(fixture.listeners.get(HTTPS_MANAGEMENT).is_none());
    assert!(endpoint.https_socket_address().await.is_none());
    assert_eq!(endpoint.https_port().await, -1);

    endpoint.stop().await.unwrap();
}

#[tokio::test]
async fn test_secure_port_without_tls_fails_start() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_secure_port(i32::from(common::free_port())),
    );

    let err = endpoint.start().await.unwrap_err();

    assert!(matches!(err, EndpointError::StartFailure(_)));
    assert_eq!(endpoint.state().await, EndpointState::Stopped);
    assert!(fixture.bindings.unnamed_registry().is_empty());
    assert!(!fixture.services.contains(HTTP_UPGRADE_SERVICE_NAME));
}

#[tokio::test]
async fn test_upgrade_service_lives_while_started() {
    let fixture = Fixture::new();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(common::free_port())),
    );

    endpoint.start().await.unwrap();

    let plain = fixture
        .services
        .get::<UpgradeRegistry>(HTTP_UPGRADE_SERVICE_NAME)
        .unwrap();
    let secure = fixture
        .services
        .get::<UpgradeRegistry>(HTTPS_UPGRADE_SERVICE_NAME)
        .unwrap();
    assert!(Arc::ptr_eq(&plain, &secure));
    assert!(Arc::ptr_eq(&plain, &endpoint.upgrade_registry().await.unwrap()));

    endpoint.stop().await.unwrap();
    assert!(!fixture.services.contains(HTTP_UPGRADE_SERVICE_NAME));
    assert!(!fixture.services.contains(HTTPS_UPGRADE_SERVICE_NAME));
    assert!(endpoint.upgrade_registry().await.is_none());
}

#[tokio::test]
async fn test_restart_after_stop() {
    let fixture = Fixture::new();
    let port = common::free_port();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(port)),
    );

    endpoint.start().await.unwrap();
    endpoint.start().await.unwrap();
    endpoint.stop().await.unwrap();
    endpoint.start().await.unwrap();

    assert_eq!(endpoint.http_port().await, i32::from(port));
    assert_eq!(fixture.bindings.unnamed_registry().len(), 1);

    endpoint.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_and_stop_leave_consistent_state() {
    let fixture = Fixture::new();
    let endpoint = Arc::new(HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(common::free_port())),
    ));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    endpoint.start().await
                } else {
                    endpoint.stop().await
                }
            })
        })
        .collect();
    for task in tasks {
        // Individual calls may lose the race; only the final state matters.
        let _ = task.await.unwrap();
    }

    let unnamed = fixture.bindings.unnamed_registry();
    match endpoint.state().await {
        EndpointState::Started => assert_eq!(unnamed.len(), 1),
        other => {
            assert_eq!(other, EndpointState::Stopped);
            assert!(unnamed.is_empty());
        }
    }

    endpoint.stop().await.unwrap();
    assert_eq!(endpoint.state().await, EndpointState::Stopped);
    assert!(unnamed.is_empty());
    assert!(fixture.listeners.is_empty());
}

#[tokio::test]
async fn test_failed_server_stop_still_resets_state() {
    let fixture = Fixture::new();
    let worker = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let endpoint = HttpManagementEndpoint::new(
        ConsoleMode::Console,
        None,
        fixture
            .deps()
            .with_interface(common::loopback())
            .with_port(i32::from(common::free_port()))
            .with_worker(worker.handle().clone()),
    );
    endpoint.start().await.unwrap();
    assert_eq!(fixture.bindings.unnamed_registry().len(), 1);

    // Tearing down the worker cancels the serving tasks underneath the endpoint.
    worker.shutdown_background();

    let err = endpoint.stop().await.unwrap_err();

    assert!(matches!(err, EndpointError::StopFailure(_)), "got {err:?}");
    assert_eq!(endpoint.state().await, EndpointState::Stopped);
    assert!(fixture.bindings.unnamed_registry().is_empty());
    assert!(fixture.listeners.is_empty());
    assert!(!fixture.services.contains(HTTP_UPGRADE_SERVICE_NAME));
    assert!(endpoint.upgrade_registry().await.is_none());
}
