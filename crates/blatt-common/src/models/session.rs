//! Search session state threaded through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use super::concept::Translation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed  => "completed",
            SessionStatus::Failed     => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed"   => Some(SessionStatus::Completed),
            "failed"      => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

/// Convergence pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Initiated,
    Searched,
    Gated,
    ScoredInitial,
    SeedsSelected,
    Expanded,
    ScoredExpanded,
    Consolidated,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Initiated      => "initiated",
            PipelineStage::Searched       => "searched",
            PipelineStage::Gated          => "gated",
            PipelineStage::ScoredInitial  => "scored_initial",
            PipelineStage::SeedsSelected  => "seeds_selected",
            PipelineStage::Expanded       => "expanded",
            PipelineStage::ScoredExpanded => "scored_expanded",
            PipelineStage::Consolidated   => "consolidated",
            PipelineStage::Completed      => "completed",
            PipelineStage::Failed         => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            PipelineStage::Initiated,
            PipelineStage::Searched,
            PipelineStage::Gated,
            PipelineStage::ScoredInitial,
            PipelineStage::SeedsSelected,
            PipelineStage::Expanded,
            PipelineStage::ScoredExpanded,
            PipelineStage::Consolidated,
            PipelineStage::Completed,
            PipelineStage::Failed,
        ]
        .into_iter()
        .find(|st| st.as_str() == s)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("session {id} is already {status:?}")]
    Terminal { id: Uuid, status: SessionStatus },
    #[error("cannot move session {id} from {from} back to {to}")]
    Backwards { id: Uuid, from: PipelineStage, to: PipelineStage },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub id: Uuid,
    pub keywords: String,
    #[serde(default)]
    pub description: String,
    pub status: SessionStatus,
    pub stage: PipelineStage,
    pub total_papers: usize,
    pub relevant_papers: usize,
    pub translation: Option<Translation>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SearchSession {
    pub fn new(keywords: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            keywords: keywords.into(),
            description: description.into(),
            status: SessionStatus::InProgress,
            stage: PipelineStage::Initiated,
            total_papers: 0,
            relevant_papers: 0,
            translation: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Keywords and description joined, as the oracle sees the user's intent.
    pub fn intent_text(&self) -> String {
        format!("{} {}", self.keywords, self.description).trim().to_string()
    }

    /// Move forward to `stage`. Stages may be skipped but never revisited.
    pub fn advance(&mut self, stage: PipelineStage) -> Result<(), SessionError> {
        self.ensure_open()?;
        if stage < self.stage {
            return Err(SessionError::Backwards { id: self.id, from: self.stage, to: stage });
        }
        self.stage = stage;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn complete(&mut self, total_papers: usize, relevant_papers: usize) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.total_papers = total_papers;
        self.relevant_papers = relevant_papers;
        self.status = SessionStatus::Completed;
        self.stage = PipelineStage::Completed;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.error = Some(error.into());
        self.status = SessionStatus::Failed;
        self.stage = PipelineStage::Failed;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.status.is_terminal() {
            Err(SessionError::Terminal { id: self.id, status: self.status })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_skip() {
        let mut s = SearchSession::new("rail", "");
        s.advance(PipelineStage::Searched).unwrap();
        s.advance(PipelineStage::Consolidated).unwrap();
        assert_eq!(
            s.advance(PipelineStage::Gated),
            Err(SessionError::Backwards {
                id: s.id,
                from: PipelineStage::Consolidated,
                to: PipelineStage::Gated
            })
        );
    }

    #[test]
    fn test_terminal_states_are_permanent() {
        let mut s = SearchSession::new("rail", "");
        s.fail("boom").unwrap();
        assert_eq!(s.status, SessionStatus::Failed);
        assert!(s.complete(1, 1).is_err());
        assert!(s.advance(PipelineStage::Consolidated).is_err());
        assert_eq!(s.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_completed_with_zero_is_not_failed() {
        let mut s = SearchSession::new("rail", "");
        s.complete(0, 0).unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.error.is_none());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for st in [SessionStatus::InProgress, SessionStatus::Completed, SessionStatus::Failed] {
            assert_eq!(SessionStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(PipelineStage::parse("scored_initial"), Some(PipelineStage::ScoredInitial));
    }
}
