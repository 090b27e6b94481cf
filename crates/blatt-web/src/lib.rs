//! blatt-web: JSON API for Blatt
//! Provides:
//!   - Search submission with background pipeline runs
//!   - Session, ranked paper and citation graph lookups
//!   - Live pipeline progress over SSE

pub mod error;
pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;

use tracing::info;

pub use error::ApiError;
pub use router::build_router;
pub use state::{AppEvent, AppState, SharedState};

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
