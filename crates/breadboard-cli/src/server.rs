//! HTTP transport: every `GET` becomes one request to the runtime.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::debug;

use breadboard_engine::{Request, RuntimeHandle};

/// Build the router serving `/`, `/chains/<name>` and `/<device>/<action>`
pub fn router(runtime: RuntimeHandle) -> Router {
    Router::new()
        .route("/", get(forward))
        .route("/{*path}", get(forward))
        .with_state(runtime)
}

async fn forward(
    State(runtime): State<RuntimeHandle>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let request = Request::from_query(uri.path(), query);
    match runtime.request(request).await {
        Ok(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(serde_json::Value::from(response.body))).into_response()
        }
        Err(e) => {
            debug!(path = %uri.path(), error = %e, "Runtime unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}
