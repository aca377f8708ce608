//! Citytiles server
//!
//! HTTP tile server and static tileset exporter over a loaded
//! [`citytiles::QuadTree`]. The index is built once at startup and shared
//! read-only across request handlers.

pub mod export;
pub mod routes;
pub mod state;

pub use export::{export_tiles, ExportStats};
pub use routes::build_router;
pub use state::{AppState, Dataset};

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Run the HTTP server until ctrl-c.
pub async fn run_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("server is running on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl_c signal");
}
