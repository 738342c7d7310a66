//! HTTP server bootstrap.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::{build_router, GatewayState};

/// Bind and serve the gateway until ctrl-c.
#[instrument(skip(state))]
pub async fn serve(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let app = build_router(state);

    info!("gateway HTTP server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
