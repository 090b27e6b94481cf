//! Shared application state for the web server.

use std::sync::Arc;

use blatt_common::{PipelineStage, SessionStatus};
use blatt_pipeline::{ConvergenceController, PipelineEvent};
use blatt_store::PaperStore;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events pushed to connected clients via SSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A search was accepted and its pipeline spawned
    SessionStarted { session_id: Uuid, keywords: String },
    /// A pipeline stage boundary
    PipelineStatus { session_id: Uuid, stage: PipelineStage, message: String, count: usize },
    /// The pipeline reached a terminal state
    SessionFinished { session_id: Uuid, status: SessionStatus, relevant_papers: usize },
    /// General system notification
    Notification { level: String, message: String },
}

impl From<PipelineEvent> for AppEvent {
    fn from(ev: PipelineEvent) -> Self {
        AppEvent::PipelineStatus { session_id: ev.session_id, stage: ev.stage, message: ev.message, count: ev.count }
    }
}

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PaperStore>,
    pub controller: Arc<ConvergenceController>,
    /// Broadcast channel for server-level SSE events
    pub event_tx: broadcast::Sender<AppEvent>,
    /// The channel the controller emits stage events on
    pub pipeline_tx: broadcast::Sender<PipelineEvent>,
}

impl AppState {
    /// `pipeline_tx` must be the sender the controller was built with.
    pub fn new(
        store: Arc<dyn PaperStore>,
        controller: Arc<ConvergenceController>,
        pipeline_tx: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { store, controller, event_tx, pipeline_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_pipeline(&self) -> broadcast::Receiver<PipelineEvent> {
        self.pipeline_tx.subscribe()
    }

    /// Dropped silently when nobody is listening.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.event_tx.send(event);
    }
}

pub type SharedState = Arc<AppState>;
