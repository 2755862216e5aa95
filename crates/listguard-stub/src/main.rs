// SPDX-License-Identifier: BUSL-1.1
//! Commerce listing stub server, standalone development binary.
//!
//! Storage is in-memory; data is lost on restart.

use std::net::SocketAddr;

use listguard_stub::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("LISTGUARD_STUB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8091);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listguard-stub listening on {addr}");

    listguard_stub::serve(listener, AppState::new()).await
}
