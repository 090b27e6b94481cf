//! Search submission: creates a session and runs the pipeline in the background.

use axum::extract::State;
use axum::Json;
use blatt_common::SearchSession;
use blatt_pipeline::RunOptions;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppEvent, SharedState};

// ── Request / response ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub keywords: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Total candidate cap for this run
    pub paper_count: Option<usize>,
    pub citation_depth: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchAccepted {
    pub search_id: Uuid,
}

// ── Handler ───────────────────────────────────────────────────────────────────

#[instrument(skip(state, req), fields(keywords = %req.keywords))]
pub async fn start_search(
    State(state): State<SharedState>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<SearchAccepted>> {
    let keywords = req.keywords.trim();
    if keywords.is_empty() {
        return Err(ApiError::BadRequest("keywords must not be empty".to_string()));
    }
    let description = req.description.as_deref().map(str::trim).unwrap_or_default();

    let session = SearchSession::new(keywords, description);
    let search_id = session.id;
    // Persist first so the session is visible before the pipeline starts.
    state.store.create_session(&session).await?;
    state.publish(AppEvent::SessionStarted { session_id: search_id, keywords: keywords.to_string() });
    info!(session = %search_id, "Search accepted");

    let options = RunOptions { total_limit: req.paper_count, citation_depth: req.citation_depth };
    let bg = state.clone();
    tokio::spawn(async move {
        let outcome = bg.controller.run_with(session, options).await;
        bg.publish(AppEvent::SessionFinished {
            session_id: outcome.session.id,
            status: outcome.session.status,
            relevant_papers: outcome.session.relevant_papers,
        });
    });

    Ok(Json(SearchAccepted { search_id }))
}
