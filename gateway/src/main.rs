use clap::Parser;
use gateway::cli::Cli;
use gateway::config::Config;
use gateway::http;
use gateway_core::registry::etcd::EtcdStore;
use gateway_core::GatewayState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let registry = Arc::new(EtcdStore::connect(&(&config.etcd).into()).await?);
    let gateway = Arc::new(GatewayState::new(registry, config.scheme.clone()));

    // Backends own their lease and announce themselves via
    // gateway_core::membership::register_instance (spec.md §5) — the
    // gateway only ever writes routing metadata into the method directory.
    for service in &config.services {
        for method in &service.methods {
            gateway
                .register_method(&service.version, &service.service, &method.name, method.authorization)
                .await?;
            tracing::info!(
                service = %service.service,
                method = %method.name,
                version = %service.version,
                "registered method"
            );
        }
    }

    let app_state = http::AppState {
        gateway,
        sign_key: config.auth.sign_key.clone(),
    };
    let app = http::router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
