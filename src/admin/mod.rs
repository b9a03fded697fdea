pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::get,
    Router,
};
use crate::http::server::ManagementState;
use self::handlers::*;
use self::auth::management_auth_middleware;

/// Routes of the management API. Every route requires authentication when an
/// authenticator is configured.
pub fn setup_management_router(state: ManagementState) -> Router {
    Router::new()
        .route("/management", get(read_root).post(execute_operation))
        .route("/management/{*path}", get(read_path))
        .route_layer(middleware::from_fn_with_state(state.clone(), management_auth_middleware))
        .with_state(state)
}

/// Routes outside the management API: upgrades, console, dynamic contexts.
pub fn setup_root_router(state: ManagementState) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/console", get(get_console))
        .fallback(dispatch_context)
        .with_state(state)
}
