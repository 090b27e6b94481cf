//! Assembles sources, LLM services, store and controller from config.

use std::sync::Arc;
use std::time::Duration;

use blatt_common::config::BlattConfig;
use blatt_llm::{
    build_backend, LlmRelevanceOracle, NullOracle, QueryTranslator, RelationshipClassifier, RelevanceOracle,
};
use blatt_pipeline::{ConvergenceController, PipelineEvent, Scorer};
use blatt_sources::{ArxivClient, CandidateAggregator, CrossRefClient, PaperSource, SemanticScholarClient, SourceRegistry};
use blatt_store::{PaperStore, SqliteStore};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub struct Components {
    pub store: Arc<dyn PaperStore>,
    pub controller: Arc<ConvergenceController>,
    pub pipeline_tx: broadcast::Sender<PipelineEvent>,
}

pub fn build_registry(config: &BlattConfig) -> anyhow::Result<SourceRegistry> {
    let timeout = Duration::from_secs(config.sources.request_timeout_secs);
    let s2 = SemanticScholarClient::new(config.sources.semantic_scholar_api_key.clone(), timeout)?;
    let arxiv = ArxivClient::new(timeout)?;
    let crossref = CrossRefClient::new(config.sources.crossref_mailto.as_deref(), timeout)?;

    if config.sources.semantic_scholar_api_key.is_none() {
        warn!("No Semantic Scholar API key set; shared rate limits apply (set SEMANTIC_SCHOLAR_API_KEY)");
    }

    Ok(SourceRegistry::new()
        .with(Arc::new(s2) as Arc<dyn PaperSource>)
        .with(Arc::new(arxiv) as Arc<dyn PaperSource>)
        .with(Arc::new(crossref) as Arc<dyn PaperSource>))
}

pub fn build(config: &BlattConfig) -> anyhow::Result<Components> {
    let backend = build_backend(&config.llm)?;
    let llm_timeout = Duration::from_secs(config.llm.call_timeout_secs);

    let oracle: Arc<dyn RelevanceOracle> = match &backend {
        Some(b) => {
            info!(model = b.model_id(), "AI relevance analysis enabled");
            Arc::new(
                LlmRelevanceOracle::new(b.clone())
                    .with_generation(config.llm.max_tokens, config.llm.temperature)
                    .with_timeout(llm_timeout),
            )
        }
        None => {
            warn!("No LLM backend available; every paper gets a neutral score");
            Arc::new(NullOracle)
        }
    };

    let registry = build_registry(config)?;
    info!(sources = ?registry.names(), "Source registry ready");

    let aggregator = Arc::new(CandidateAggregator::from_config(registry, &config.sources));
    let translator = Arc::new(QueryTranslator::new(backend.clone()).with_timeout(llm_timeout));
    let scorer = Arc::new(Scorer::from_config(oracle, &config.scoring));

    let store: Arc<dyn PaperStore> = Arc::new(SqliteStore::open(&config.database.path)?);
    info!(path = %config.database.path, "Store opened");

    let (pipeline_tx, _) = broadcast::channel(256);
    let mut controller = ConvergenceController::new(aggregator, translator, scorer, store.clone(), config)
        .with_events(pipeline_tx.clone());
    if let Some(b) = backend {
        controller = controller.with_classifier(Arc::new(RelationshipClassifier::new(b).with_timeout(llm_timeout)));
    }

    Ok(Components { store, controller: Arc::new(controller), pipeline_tx })
}
