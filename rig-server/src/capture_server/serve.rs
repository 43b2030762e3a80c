use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use super::{create_router, ServerArgs, ServerState};

/// Serve the capture API until `shutdown` resolves.
///
/// Open status streams are closed when shutdown begins so in-flight requests
/// can drain. A capture run in progress is not cancelled here.
pub async fn run_server(
    state: Arc<ServerState>,
    args: &ServerArgs,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.bind_address, args.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {e}"))?;

    let app = create_router(state.clone());

    info!("Starting server on http://{}", addr);
    info!("Start capture: POST http://{}/run", addr);
    info!("Cancel capture: POST http://{}/cancel", addr);
    info!("Status stream: http://{}/status/stream", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        info!("Shutting down HTTP server");
        state.begin_shutdown();
    })
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;

    Ok(())
}
