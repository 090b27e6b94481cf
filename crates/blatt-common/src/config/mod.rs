//! Configuration loading for Blatt.
//! Reads blatt.toml from the current directory or the path in BLATT_CONFIG,
//! then applies environment overrides (after loading `.env` via dotenvy).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BlattError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BlattConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

// ── Storage / export ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "data/blatt.db".to_string() }

impl Default for DatabaseConfig {
    fn default() -> Self { Self { path: default_db_path() } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: String,
}

fn default_export_dir() -> String { "exports".to_string() }

impl Default for ExportConfig {
    fn default() -> Self { Self { dir: default_export_dir() } }
}

// ── Sources ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Explicit source order ("s2", "arxiv", "crossref"). Empty = dynamic routing.
    #[serde(default)]
    pub enabled: Vec<String>,
    pub semantic_scholar_api_key: Option<String>,
    pub crossref_mailto: Option<String>,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub complete_abstracts: bool,
}

fn default_call_timeout()    -> u64  { 60 }
fn default_request_timeout() -> u64  { 30 }
fn default_true()            -> bool { true }

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            semantic_scholar_api_key: None,
            crossref_mailto: None,
            call_timeout_secs: default_call_timeout(),
            request_timeout_secs: default_request_timeout(),
            complete_abstracts: default_true(),
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "anthropic" | "openai" | "ollama" | "none"
    #[serde(default = "default_llm_backend")]
    pub backend: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout")]
    pub call_timeout_secs: u64,
}

fn default_llm_backend() -> String { "anthropic".to_string() }
fn default_llm_model()   -> String { "claude-3-5-haiku-20241022".to_string() }
fn default_max_tokens()  -> u32    { 2000 }
fn default_llm_timeout() -> u64    { 120 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_llm_backend(),
            model: default_llm_model(),
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            call_timeout_secs: default_llm_timeout(),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_papers_per_query")]
    pub papers_per_query: usize,
    #[serde(default = "default_total_limit")]
    pub total_limit: usize,
    #[serde(default = "default_citation_depth")]
    pub citation_depth: usize,
    #[serde(default = "default_min_priority")]
    pub min_priority_threshold: u8,
    pub year_from: Option<i32>,
}

fn default_papers_per_query()    -> usize { 12 }
fn default_total_limit()         -> usize { 200 }
fn default_citation_depth()      -> usize { 1 }
fn default_min_priority()        -> u8    { 4 }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            papers_per_query: default_papers_per_query(),
            total_limit: default_total_limit(),
            citation_depth: default_citation_depth(),
            min_priority_threshold: default_min_priority(),
            year_from: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_min_match_ratio")]
    pub min_match_ratio: f64,
    #[serde(default = "default_min_survivors")]
    pub min_survivors: usize,
}

fn default_min_match_ratio() -> f64   { 0.6 }
fn default_min_survivors()   -> usize { 30 }

impl Default for GateConfig {
    fn default() -> Self {
        Self { min_match_ratio: default_min_match_ratio(), min_survivors: default_min_survivors() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    #[serde(default = "default_oversample")]
    pub oversample: usize,
    #[serde(default = "default_tier5_per_paper")]
    pub tier5_per_paper: usize,
    #[serde(default = "default_tier5_global")]
    pub tier5_global: usize,
    #[serde(default = "default_tier4_per_paper")]
    pub tier4_per_paper: usize,
    #[serde(default = "default_tier4_global")]
    pub tier4_global: usize,
    #[serde(default)]
    pub min_citation_count: u32,
}

fn default_oversample()      -> usize { 100 }
fn default_tier5_per_paper() -> usize { 12 }
fn default_tier5_global()    -> usize { 180 }
fn default_tier4_per_paper() -> usize { 10 }
fn default_tier4_global()    -> usize { 150 }

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            oversample: default_oversample(),
            tier5_per_paper: default_tier5_per_paper(),
            tier5_global: default_tier5_global(),
            tier4_per_paper: default_tier4_per_paper(),
            tier4_global: default_tier4_global(),
            min_citation_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_relationship_analyses")]
    pub max_relationship_analyses: usize,
    /// Domain vocabulary. When the user's keywords mention one of these, a
    /// top-tier paper must carry one in its matched keywords.
    #[serde(default)]
    pub domain_terms: Vec<String>,
    #[serde(default = "default_missing_concept_phrases")]
    pub missing_concept_phrases: Vec<String>,
    #[serde(default = "default_scenario_triggers")]
    pub scenario_triggers: Vec<String>,
    #[serde(default = "default_scenario_terms")]
    pub scenario_terms: Vec<String>,
}

fn default_batch_size()                -> usize { 10 }
fn default_max_relationship_analyses() -> usize { 50 }

fn default_missing_concept_phrases() -> Vec<String> {
    ["missing primary concept", "concept missing", "missing core concept"]
        .map(String::from)
        .to_vec()
}

fn default_scenario_triggers() -> Vec<String> {
    ["training", "test", "testing", "validation", "verify", "evaluation", "scenario", "benchmark"]
        .map(String::from)
        .to_vec()
}

fn default_scenario_terms() -> Vec<String> {
    ["training", "testing", "validation", "evaluation", "benchmark", "scenario"]
        .map(String::from)
        .to_vec()
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_relationship_analyses: default_max_relationship_analyses(),
            domain_terms: Vec::new(),
            missing_concept_phrases: default_missing_concept_phrases(),
            scenario_triggers: default_scenario_triggers(),
            scenario_terms: default_scenario_terms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "0.0.0.0:5000".to_string() }

impl Default for ServerConfig {
    fn default() -> Self { Self { bind: default_bind() } }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BlattConfig {
    /// Load `.env`, then the TOML file, then environment overrides.
    /// A missing file yields defaults so a bare checkout still runs.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let path = std::env::var("BLATT_CONFIG").unwrap_or_else(|_| "blatt.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(Path::new(&path))?
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BlattConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Environment overrides. `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.llm.api_key.is_none() {
            self.llm.api_key = match self.llm.backend.as_str() {
                "openai" => non_empty("OPENAI_API_KEY"),
                _ => non_empty("CLAUDE_API_KEY").or_else(|| non_empty("ANTHROPIC_API_KEY")),
            };
        }
        if let Some(key) = non_empty("SEMANTIC_SCHOLAR_API_KEY") {
            self.sources.semantic_scholar_api_key = Some(key);
        }
        if let Some(mailto) = non_empty("CROSSREF_MAILTO") {
            self.sources.crossref_mailto = Some(mailto);
        }
        if let Some(path) = non_empty("BLATT_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(bind) = non_empty("BLATT_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<(), BlattError> {
        if !(0.0..=1.0).contains(&self.gate.min_match_ratio) {
            return Err(BlattError::Config(format!(
                "gate.min_match_ratio must be within [0, 1], got {}",
                self.gate.min_match_ratio
            )));
        }
        if self.scoring.batch_size == 0 || self.scoring.batch_size > 10 {
            return Err(BlattError::Config(format!(
                "scoring.batch_size must be 1..=10, got {}",
                self.scoring.batch_size
            )));
        }
        if !(1..=5).contains(&self.search.min_priority_threshold) {
            return Err(BlattError::Config(format!(
                "search.min_priority_threshold must be 1..=5, got {}",
                self.search.min_priority_threshold
            )));
        }
        Ok(())
    }

    /// Whether an LLM backend is usable with the current settings.
    pub fn llm_enabled(&self) -> bool {
        match self.llm.backend.as_str() {
            "none" => false,
            "ollama" => true,
            _ => self.llm.api_key.is_some(),
        }
    }
}
