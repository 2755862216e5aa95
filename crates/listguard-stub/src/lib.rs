// SPDX-License-Identifier: BUSL-1.1
//! In-memory commerce listing API.
//!
//! Serves just enough of a commerce backend (join/login, channels, products)
//! for the verifier to have something honest to check: 1-based pagination,
//! exact/substring/range filters, `sortBy`/`sortDirection`, and role- and
//! tenant-scoped visibility. Storage is in-memory (DashMap) with no
//! persistence.

pub mod listing;
pub mod routes;
pub mod store;

pub use routes::router;
pub use store::AppState;

/// Serve the stub on `listener` until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state).into_make_service()).await
}
