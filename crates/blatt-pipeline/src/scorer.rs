//! Batched scoring through a `RelevanceOracle`, followed by the
//! post-processing caps.

use std::sync::Arc;

use blatt_common::config::ScoringConfig;
use blatt_common::{Paper, Score};
use blatt_llm::oracle::MAX_BATCH;
use blatt_llm::{post_process, OracleError, PostProcessRules, RelevanceOracle, UserIntent, Verdict};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const REASON_PARSE_FAILED: &str = "Batch analysis failed (JSON parse error)";

/// How a failed oracle batch is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// The first failure aborts scoring.
    Strict,
    /// A failed batch is defaulted to the neutral priority.
    Lenient,
}

#[derive(Debug, Clone, Default)]
pub struct ScoringReport {
    /// One score per input paper, in input order.
    pub scores: Vec<Score>,
    pub failed_batches: usize,
    /// Scores lowered by post-processing.
    pub adjusted: usize,
}

pub struct Scorer {
    oracle: Arc<dyn RelevanceOracle>,
    batch_size: usize,
    rules: PostProcessRules,
}

impl Scorer {
    pub fn new(oracle: Arc<dyn RelevanceOracle>) -> Self {
        Self { oracle, batch_size: MAX_BATCH, rules: PostProcessRules::default() }
    }

    pub fn from_config(oracle: Arc<dyn RelevanceOracle>, cfg: &ScoringConfig) -> Self {
        Self::new(oracle).with_batch_size(cfg.batch_size).with_rules(PostProcessRules::from(cfg))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH);
        self
    }

    pub fn with_rules(mut self, rules: PostProcessRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn is_ai(&self) -> bool {
        self.oracle.is_ai()
    }

    #[instrument(skip(self, papers, intent), fields(papers = papers.len(), mode = ?mode))]
    pub async fn score_all(
        &self,
        search_id: Uuid,
        papers: &[Paper],
        intent: &UserIntent,
        mode: ScoringMode,
    ) -> Result<ScoringReport, OracleError> {
        let mut report = ScoringReport::default();

        for (batch_no, batch) in papers.chunks(self.batch_size).enumerate() {
            let verdicts = match self.oracle.score_batch(batch, intent).await {
                Ok(v) => v,
                Err(e) if mode == ScoringMode::Strict => {
                    warn!(batch = batch_no, error = %e, "Oracle batch failed in strict mode");
                    return Err(e);
                }
                Err(e) => {
                    warn!(batch = batch_no, error = %e, "Oracle batch failed, defaulting to neutral priority");
                    report.failed_batches += 1;
                    let reason = failure_reason(&e);
                    (0..batch.len()).map(|i| Verdict::neutral(i, reason.clone())).collect()
                }
            };

            for (i, paper) in batch.iter().enumerate() {
                let verdict = verdicts
                    .iter()
                    .find(|v| v.index == i)
                    .cloned()
                    .unwrap_or_else(|| Verdict::neutral(i, blatt_llm::oracle::REASON_NOT_COVERED));
                let mut score = verdict.into_score(search_id, &paper.id);
                if post_process(&mut score, intent, &self.rules) {
                    report.adjusted += 1;
                }
                report.scores.push(score);
            }
            debug!(batch = batch_no, scored = report.scores.len(), "Batch scored");
        }

        info!(
            scored = report.scores.len(),
            failed_batches = report.failed_batches,
            adjusted = report.adjusted,
            "Scoring complete"
        );
        Ok(report)
    }
}

fn failure_reason(error: &OracleError) -> String {
    match error {
        OracleError::Parse(_) => REASON_PARSE_FAILED.to_string(),
        other => format!("Batch analysis failed: {other}"),
    }
}
