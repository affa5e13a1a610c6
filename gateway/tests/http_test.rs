//! Exercises the HTTP edge end to end against an in-process echo backend,
//! without a real etcd cluster (`MemoryStore` stands in for the registry).

use axum::body::Body;
use axum::http::{Request, StatusCode};
use echo_service::{EchoServiceImpl, EchoServiceServer, FILE_DESCRIPTOR_SET};
use gateway::http::{router, AppState};
use gateway_core::registry::memory::MemoryStore;
use gateway_core::{GatewayState, KvStore};
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::transport::Server;
use tower::ServiceExt;

async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(reflection)
            .add_service(EchoServiceServer::new(EchoServiceImpl))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

async fn build_app() -> axum::Router {
    let addr = spawn_echo_server().await;
    let registry = Arc::new(MemoryStore::new());
    registry
        .put("/grpc/echo.EchoService/1", &addr.to_string())
        .await
        .unwrap();

    let gateway = Arc::new(GatewayState::new(registry, "grpc"));
    gateway
        .register_method("v1", "echo.EchoService", "Say", false)
        .await
        .unwrap();

    router(AppState {
        gateway,
        sign_key: "test-secret".to_string(),
    })
}

#[tokio::test]
async fn health_route_is_always_ok() {
    let app = build_app().await;
    let response = app
        .oneshot(Request::get("/vi/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invoke_route_returns_envelope_with_data() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::post("/v1/echo.EchoService/Say")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"message":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 0);
    assert_eq!(json["data"]["message"], "hi");
}

#[tokio::test]
async fn invoke_route_reports_method_not_found() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::post("/v1/echo.EchoService/Missing")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 10003);
}

#[tokio::test]
async fn invoke_route_reports_malformed_json() {
    let app = build_app().await;
    let response = app
        .oneshot(
            Request::post("/v1/echo.EchoService/Say")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 10001);
}
