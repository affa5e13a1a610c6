//! The HTTP edge: `POST /{version}/{service}/{method}` plus the two static
//! routes from `api/router.go`. Every response is HTTP 200 with the result
//! or error carried in the body, matching `service/rpc.go`'s `res` type.

use crate::auth::authenticate;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use gateway_core::{GatewayState, InvokeRequest};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
    pub sign_key: String,
}

#[derive(Serialize)]
struct Envelope {
    code: i32,
    msg: String,
    data: serde_json::Value,
}

impl Envelope {
    fn ok(data: serde_json::Value) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data,
        }
    }

    fn err(error: &gateway_core::InvokeError) -> Self {
        Self {
            code: error.code().code(),
            msg: error.to_string(),
            data: serde_json::Value::Null,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(greet))
        .route("/vi/health", get(health))
        .route("/{version}/{service}/{method}", post(invoke))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn greet() -> &'static str {
    "Welcome to the gateway"
}

async fn health() -> &'static str {
    "ok"
}

async fn invoke(
    State(state): State<AppState>,
    Path((version, service, method)): Path<(String, String, String)>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let caller = authenticate(&headers, &state.sign_key);

    let parsed_body: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            let invoke_err = gateway_core::InvokeError::ArgsParseFailed(err);
            return Json(Envelope::err(&invoke_err));
        }
    };

    let request = InvokeRequest {
        version,
        service,
        method,
        body: parsed_body,
        remote_addr: remote_addr.ip().to_string(),
        caller,
    };

    match state.gateway.invoke(request).await {
        Ok(data) => Json(Envelope::ok(data)),
        Err(err) => {
            tracing::warn!(error = %err, code = err.code().code(), "invoke failed");
            Json(Envelope::err(&err))
        }
    }
}
