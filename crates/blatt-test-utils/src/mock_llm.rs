//! Scripted LLM backend and relevance oracle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use blatt_common::{DomainMatch, Paper};
use blatt_llm::{LlmBackend, LlmError, LlmRequest, LlmResponse, OracleError, RelevanceOracle, UserIntent, Verdict};

// ── Backend ──────────────────────────────────────────────────────────────────

/// Replies from a queue, in order. When the queue is empty the fallback
/// reply is used, or the call fails if there is none.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, content: &str) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(content.to_string()));
        }
        self
    }

    pub fn fail(self, message: &str) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(message.to_string()));
        }
        self
    }

    pub fn with_fallback(mut self, content: &str) -> Self {
        self.fallback = Some(content.to_string());
        self
    }

    /// User text of every request received.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(req.user_text());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        let content = match next {
            Some(Ok(content)) => content,
            Some(Err(msg)) => return Err(LlmError::Unavailable(msg)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Unavailable("script exhausted".to_string()))?,
        };
        Ok(LlmResponse {
            content,
            model: "scripted".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    fn is_local(&self) -> bool {
        true
    }
}

// ── Oracle ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Judgment {
    priority: u8,
    matched_keywords: Vec<String>,
    domain_match: DomainMatch,
    reason: String,
}

/// Assigns fixed priorities by paper id. Unscripted papers get the default
/// priority (3). Batches containing a poisoned id fail with a parse error.
pub struct ScriptedOracle {
    judgments: HashMap<String, Judgment>,
    default_priority: u8,
    poisoned: HashSet<String>,
    fail_all: bool,
    batches: Mutex<Vec<Vec<String>>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            judgments: HashMap::new(),
            default_priority: 3,
            poisoned: HashSet::new(),
            fail_all: false,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn with(self, paper_id: &str, priority: u8) -> Self {
        self.with_judgment(paper_id, priority, &[], DomainMatch::General, "")
    }

    pub fn with_judgment(
        mut self,
        paper_id: &str,
        priority: u8,
        matched_keywords: &[&str],
        domain_match: DomainMatch,
        reason: &str,
    ) -> Self {
        self.judgments.insert(
            paper_id.to_string(),
            Judgment {
                priority,
                matched_keywords: matched_keywords.iter().map(|k| k.to_string()).collect(),
                domain_match,
                reason: reason.to_string(),
            },
        );
        self
    }

    pub fn with_default_priority(mut self, priority: u8) -> Self {
        self.default_priority = priority;
        self
    }

    /// Any batch containing `paper_id` fails.
    pub fn poison(mut self, paper_id: &str) -> Self {
        self.poisoned.insert(paper_id.to_string());
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Paper ids of every batch received, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn scored_ids(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelevanceOracle for ScriptedOracle {
    async fn score_batch(&self, papers: &[Paper], _intent: &UserIntent) -> Result<Vec<Verdict>, OracleError> {
        if let Ok(mut b) = self.batches.lock() {
            b.push(papers.iter().map(|p| p.id.clone()).collect());
        }
        if self.fail_all || papers.iter().any(|p| self.poisoned.contains(&p.id)) {
            return Err(OracleError::Parse("expected value at line 1 column 1".to_string()));
        }
        Ok(papers
            .iter()
            .enumerate()
            .map(|(index, p)| match self.judgments.get(&p.id) {
                Some(j) => Verdict {
                    index,
                    priority: j.priority,
                    matched_keywords: j.matched_keywords.clone(),
                    domain_match: j.domain_match,
                    reason: j.reason.clone(),
                },
                None => Verdict {
                    index,
                    priority: self.default_priority,
                    matched_keywords: Vec::new(),
                    domain_match: DomainMatch::General,
                    reason: String::new(),
                },
            })
            .collect())
    }
}
