//! End-to-end: directory lookup, reflection-driven descriptor resolution,
//! JSON transcoding and the unary call, against an in-process echo backend.
//! Shaped after `granc-core/tests/granc_client_online_test.rs`.

use echo_service::{EchoServiceImpl, EchoServiceServer, FILE_DESCRIPTOR_SET};
use gateway_core::registry::memory::MemoryStore;
use gateway_core::{GatewayState, InvokeRequest, KvStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tonic::transport::Server;

async fn spawn_echo_server() -> std::net::SocketAddr {
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

#[tokio::test]
async fn invoke_roundtrips_json_through_reflection_and_grpc() {
    let addr = spawn_echo_server().await;

    let registry = Arc::new(MemoryStore::new());
    registry.put("/grpc/echo.EchoService/1", &addr.to_string()).await.unwrap();

    let state = GatewayState::new(registry.clone(), "grpc");
    state
        .register_method("v1", "echo.EchoService", "Say", false)
        .await
        .unwrap();

    let response = state
        .invoke(InvokeRequest {
            version: "v1".to_string(),
            service: "echo.EchoService".to_string(),
            method: "Say".to_string(),
            body: serde_json::json!({"message": "hello"}),
            remote_addr: "127.0.0.1".to_string(),
            caller: None,
        })
        .await
        .unwrap();

    assert_eq!(response["message"], "hello");
}

#[tokio::test]
async fn invoke_requires_login_for_protected_method() {
    let addr = spawn_echo_server().await;

    let registry = Arc::new(MemoryStore::new());
    registry.put("/grpc/echo.EchoService/1", &addr.to_string()).await.unwrap();

    let state = GatewayState::new(registry.clone(), "grpc");
    state
        .register_method("v1", "echo.EchoService", "Say", true)
        .await
        .unwrap();

    let err = state
        .invoke(InvokeRequest {
            version: "v1".to_string(),
            service: "echo.EchoService".to_string(),
            method: "Say".to_string(),
            body: serde_json::json!({"message": "hello"}),
            remote_addr: "127.0.0.1".to_string(),
            caller: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, gateway_core::InvokeError::LoginRequired));
}

#[tokio::test]
async fn invoke_unknown_method_is_not_found() {
    let registry = Arc::new(MemoryStore::new());
    let state = GatewayState::new(registry, "grpc");

    let err = state
        .invoke(InvokeRequest {
            version: "v1".to_string(),
            service: "echo.EchoService".to_string(),
            method: "Missing".to_string(),
            body: serde_json::json!({}),
            remote_addr: "127.0.0.1".to_string(),
            caller: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        gateway_core::InvokeError::Directory(gateway_core::DirectoryError::NotFound(_))
    ));
}
