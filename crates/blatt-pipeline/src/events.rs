//! Progress events emitted at each stage boundary.

use blatt_common::PipelineStage;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub session_id: Uuid,
    pub stage: PipelineStage,
    pub message: String,
    pub count: usize,
}

/// Optional broadcast sink. Sending never fails the pipeline: with no
/// subscribers the event is dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<broadcast::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: broadcast::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, session_id: Uuid, stage: PipelineStage, message: impl Into<String>, count: usize) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(PipelineEvent { session_id, stage, message: message.into(), count });
        }
    }
}
