//! The storage interface the pipeline and web layer depend on.

use async_trait::async_trait;
use blatt_common::{Paper, RankedPaper, Relationship, Score, SearchSession};
use uuid::Uuid;

use crate::error::Result;

#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Insert, or merge into the existing record without erasing fields.
    async fn upsert_paper(&self, paper: &Paper) -> Result<()>;

    async fn upsert_papers(&self, papers: &[Paper]) -> Result<usize>;

    async fn get_paper(&self, id: &str) -> Result<Option<Paper>>;

    /// One edge per ordered pair; a later write replaces type and description.
    async fn upsert_relationship(&self, rel: &Relationship) -> Result<()>;

    async fn upsert_relationships(&self, rels: &[Relationship]) -> Result<usize> {
        for rel in rels {
            self.upsert_relationship(rel).await?;
        }
        Ok(rels.len())
    }

    /// Edges whose endpoints are both in `ids`.
    async fn relationships_among(&self, ids: &[String]) -> Result<Vec<Relationship>>;

    /// Rescoring the same `(search_id, paper_id)` overwrites.
    async fn upsert_score(&self, score: &Score) -> Result<()>;

    /// Papers scored in `search_id` at or above `min_priority`, ordered by
    /// priority then citation count, both descending.
    async fn scored_papers(&self, search_id: Uuid, min_priority: u8) -> Result<Vec<RankedPaper>>;

    async fn create_session(&self, session: &SearchSession) -> Result<()>;

    async fn update_session(&self, session: &SearchSession) -> Result<()>;

    async fn get_session(&self, id: Uuid) -> Result<Option<SearchSession>>;

    /// Most recent first.
    async fn list_sessions(&self, limit: usize) -> Result<Vec<SearchSession>>;
}
