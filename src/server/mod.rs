pub mod app_state;

use std::{net::SocketAddr, sync::Arc};

use tracing::info;

pub use app_state::{AppState, PROXY_TIMEOUT};

use crate::common::types::AnyResult;

/// Binds `server.host:server.port` and serves until Ctrl+C.
pub async fn serve(state: Arc<AppState>) -> AnyResult<()> {
  let address: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
  let app = crate::rest::router(state);

  let listener = tokio::net::TcpListener::bind(address).await?;
  info!("Listening on {}", address);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!("Failed to listen for shutdown signal: {}", e);
    std::future::pending::<()>().await;
  }
  info!("Shutdown signal received");
}
