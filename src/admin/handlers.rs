use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::admin::auth::authorize;
use crate::controller::{ModelError, Operation};
use crate::http::contexts::ManagementContext;
use crate::http::server::ManagementState;

/// Outcome envelope returned by every management operation.
#[derive(Serialize)]
pub struct OperationOutcome {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(rename = "failure-description", skip_serializing_if = "Option::is_none")]
    pub failure_description: Option<String>,
}

#[derive(Serialize)]
pub struct ConsoleStatus {
    pub mode: &'static str,
    pub notice: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

/// `GET /`: protocol upgrade, else the console.
pub async fn get_root(State(state): State<ManagementState>, request: Request) -> Response {
    let request = match state.upgrades.try_upgrade(request, &state.shutdown) {
        Ok(switching) => return switching,
        Err(request) => request,
    };

    if request.headers().contains_key(header::UPGRADE) {
        tracing::debug!(
            upgrade = ?request.headers().get(header::UPGRADE),
            "Upgrade requested for an unregistered protocol"
        );
    }

    if state.console.mode.has_console() {
        Redirect::temporary("/console").into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

pub async fn get_console(State(state): State<ManagementState>) -> Response {
    match state.console.mode.landing_notice() {
        Some(notice) => Json(ConsoleStatus {
            mode: state.console.mode.as_str(),
            notice,
            slot: state.console.slot.clone(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn read_root(State(state): State<ManagementState>) -> Response {
    run_operation(&state, Operation::read_resource(Vec::new())).await
}

pub async fn read_path(
    State(state): State<ManagementState>,
    Path(path): Path<String>,
) -> Response {
    run_operation(&state, Operation::read_resource(Operation::address_from_path(&path))).await
}

pub async fn execute_operation(
    State(state): State<ManagementState>,
    Json(operation): Json<Operation>,
) -> Response {
    run_operation(&state, operation).await
}

/// Fallback: dispatch to a dynamically added context.
pub async fn dispatch_context(State(state): State<ManagementState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let Some((context, rest)) = state.contexts.route(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match context {
        ManagementContext::Static(dir) => serve_static(dir, rest, request).await,
        ManagementContext::GetRemap(remapper) => {
            if request.method() != Method::GET {
                return StatusCode::METHOD_NOT_ALLOWED.into_response();
            }
            // Remapped reads reach the model like /management and need the same credentials.
            if let Err(rejection) = authorize(&state, &request) {
                return rejection;
            }
            match remapper.remap_path(rest) {
                Some(remapped) => {
                    let operation = Operation::read_resource(Operation::address_from_path(&remapped));
                    run_operation(&state, operation).await
                }
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
    }
}

async fn serve_static(dir: std::path::PathBuf, rest: &str, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let target = match parts.uri.query() {
        Some(query) => format!("{}?{}", rest, query),
        None => rest.to_string(),
    };
    parts.uri = match target.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    match ServeDir::new(dir).oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Run an operation on the executor and wrap the outcome.
pub async fn run_operation(state: &ManagementState, operation: Operation) -> Response {
    let controller = state.controller.clone();
    let name = operation.operation.clone();
    let result = state
        .executor
        .spawn_blocking(move || controller.execute(operation))
        .await;

    let (status, outcome) = match result {
        Ok(Ok(value)) => (
            StatusCode::OK,
            OperationOutcome {
                outcome: "success",
                result: Some(value),
                failure_description: None,
            },
        ),
        Ok(Err(error)) => {
            let status = match error {
                ModelError::NotFound(_) => StatusCode::NOT_FOUND,
                ModelError::UnknownOperation(_) | ModelError::MissingParameter(_) => {
                    StatusCode::BAD_REQUEST
                }
                ModelError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::debug!(operation = %name, error = %error, "Management operation failed");
            (status, failed(error.to_string()))
        }
        Err(join_error) => {
            tracing::error!(operation = %name, error = %join_error, "Management operation aborted");
            (StatusCode::INTERNAL_SERVER_ERROR, failed(join_error.to_string()))
        }
    };

    let mut response = (status, Json(outcome)).into_response();
    if let Some(process_state) = &state.process_state {
        response.headers_mut().insert(
            "x-process-state",
            HeaderValue::from_static(process_state.state().as_str()),
        );
    }
    response
}

fn failed(description: String) -> OperationOutcome {
    OperationOutcome {
        outcome: "failed",
        result: None,
        failure_description: Some(description),
    }
}
