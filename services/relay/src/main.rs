use std::env;
use std::path::Path;
use std::sync::Arc;

use relay::config::{self, RelayConfig};
use relay::state::RelayState;
use relay::storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let config = match env::var("RELAY_CONFIG") {
        Ok(path) => config::load_config_from_path(Path::new(&path)).expect("invalid config file"),
        Err(_) => RelayConfig::default(),
    };

    let storage =
        Arc::new(Storage::mount(config.storage_config()).expect("failed to mount storage"));
    let cleanup = tokio::spawn(storage.clone().run_cleanup());

    let bind_addr = config.bind_addr.clone();
    let state = RelayState::new(config, storage.clone());
    let router = relay::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "relay listening");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");

    // Stop the cleanup loop and write a final index snapshot.
    storage.shutdown();
    let _ = cleanup.await;
    info!("relay shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
