//! Server startup and lifecycle

use crate::{routes, AppState, GatewayConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run the gateway server
pub async fn run_server(config: GatewayConfig) -> anyhow::Result<()> {
    run_server_with_shutdown(config, std::future::pending()).await
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: GatewayConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone()).await?);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("Tollgate listening on http://{}", addr);

    serve(listener, state, shutdown_signal).await?;

    info!("Gateway shutdown complete");
    Ok(())
}

/// Serve the gateway on an already bound listener
///
/// Starts the idle-window sweeper for the lifetime of the server.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let sweeper = state.limiter.spawn_sweeper(state.config.sweep_interval());
    let app = routes::create_router(state);

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await;

    sweeper.abort();
    result
}
