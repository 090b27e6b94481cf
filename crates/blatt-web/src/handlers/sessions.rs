//! Session, paper and graph lookups.

use axum::extract::{Path, Query, State};
use axum::Json;
use blatt_common::{RankedPaper, SearchSession};
use blatt_export::GraphDocument;
use blatt_pipeline::controller::{consolidate, MIN_VISIBLE_PRIORITY};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;

const DEFAULT_SESSION_LIMIT: usize = 50;

#[derive(Debug, Deserialize, Default)]
pub struct SessionListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PaperQuery {
    pub min_priority: Option<u8>,
}

async fn require_session(state: &SharedState, id: Uuid) -> ApiResult<SearchSession> {
    state
        .store
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No search session {id}")))
}

pub async fn list_sessions(
    State(state): State<SharedState>,
    Query(q): Query<SessionListQuery>,
) -> ApiResult<Json<Vec<SearchSession>>> {
    let sessions = state.store.list_sessions(q.limit.unwrap_or(DEFAULT_SESSION_LIMIT)).await?;
    Ok(Json(sessions))
}

pub async fn get_session(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Json<SearchSession>> {
    Ok(Json(require_session(&state, id).await?))
}

/// Scored papers, best first. `min_priority` defaults to 4.
pub async fn session_papers(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(q): Query<PaperQuery>,
) -> ApiResult<Json<Vec<RankedPaper>>> {
    require_session(&state, id).await?;
    let min = q.min_priority.unwrap_or(MIN_VISIBLE_PRIORITY).clamp(1, 5);
    Ok(Json(state.store.scored_papers(id, min).await?))
}

/// The consolidated papers and the stored edges among them.
pub async fn session_graph(State(state): State<SharedState>, Path(id): Path<Uuid>) -> ApiResult<Json<GraphDocument>> {
    require_session(&state, id).await?;
    let papers = consolidate(state.store.scored_papers(id, MIN_VISIBLE_PRIORITY).await?);
    let ids: Vec<String> = papers.iter().map(|r| r.paper.id.clone()).collect();
    let relationships = state.store.relationships_among(&ids).await?;
    Ok(Json(blatt_export::graph::build(&papers, &relationships)))
}
