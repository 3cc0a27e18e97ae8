#[macro_use]
extern crate tracing;

pub mod endpoints;
pub mod error;
pub mod router;
pub mod streams;

use eyre::{
    Context as _,
    Result,
};
use std::net::SocketAddr;
use stream_harvester_pool::{
    Control,
    StreamConnector,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub async fn bind(address: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .wrap_err_with(|| format!("Failed to bind control server to {address}"))
}

/// Serve the control API on `listener` until `shutdown` is cancelled.
pub async fn serve<C: StreamConnector>(
    listener: TcpListener,
    control: Control<C>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router::create_router(control);
    info!("control server listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    debug!("control server stopped");
    Ok(())
}
