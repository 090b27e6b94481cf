//! SQLite-backed `PaperStore`.
//!
//! One connection behind a mutex serialises every write. Queries are short
//! and never await while the lock is held.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use blatt_common::{
    DomainMatch, Paper, PipelineStage, RankedPaper, Relationship, RelationshipType, Score, SearchSession,
    SessionStatus, SourceKind,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::store::PaperStore;

const PAPER_COLUMNS: &str =
    "p.id, p.title, p.authors, p.year, p.abstract, p.doi, p.citation_count, p.url, p.venue, p.fields_of_study, p.source";

const SESSION_COLUMNS: &str = "id, keywords, description, status, stage, total_papers, relevant_papers, \
                               translation, error, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Opened paper store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        migrations::run_migrations(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

// ── Row decoding ─────────────────────────────────────────────────────────────

struct RawPaper {
    id: String,
    title: String,
    authors: String,
    year: Option<i32>,
    abstract_text: Option<String>,
    doi: Option<String>,
    citation_count: i64,
    url: Option<String>,
    venue: Option<String>,
    fields_of_study: String,
    source: String,
}

impl RawPaper {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            authors: row.get(2)?,
            year: row.get(3)?,
            abstract_text: row.get(4)?,
            doi: row.get(5)?,
            citation_count: row.get(6)?,
            url: row.get(7)?,
            venue: row.get(8)?,
            fields_of_study: row.get(9)?,
            source: row.get(10)?,
        })
    }

    fn into_paper(self) -> Result<Paper> {
        let authors: Vec<String> = serde_json::from_str(&self.authors)?;
        let fields_of_study: BTreeSet<String> = serde_json::from_str(&self.fields_of_study)?;
        Ok(Paper {
            id: self.id,
            title: self.title,
            authors,
            year: self.year,
            abstract_text: self.abstract_text,
            doi: self.doi,
            citation_count: self.citation_count.max(0) as u32,
            url: self.url,
            venue: self.venue,
            fields_of_study,
            source: SourceKind::parse(&self.source),
        })
    }
}

struct RawScore {
    priority: i64,
    matched_keywords: String,
    domain_match: String,
    reason: String,
}

impl RawScore {
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            priority: row.get(offset)?,
            matched_keywords: row.get(offset + 1)?,
            domain_match: row.get(offset + 2)?,
            reason: row.get(offset + 3)?,
        })
    }

    fn into_score(self, search_id: Uuid, paper_id: &str) -> Result<Score> {
        let mut score = Score::new(search_id, paper_id, self.priority.clamp(1, 5) as u8);
        score.matched_keywords = serde_json::from_str(&self.matched_keywords)?;
        score.domain_match = DomainMatch::parse_lenient(&self.domain_match);
        score.reason = self.reason;
        Ok(score)
    }
}

struct RawSession {
    id: String,
    keywords: String,
    description: String,
    status: String,
    stage: String,
    total_papers: i64,
    relevant_papers: i64,
    translation: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            keywords: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            stage: row.get(4)?,
            total_papers: row.get(5)?,
            relevant_papers: row.get(6)?,
            translation: row.get(7)?,
            error: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_session(self) -> Result<SearchSession> {
        let decode = |message: String| StoreError::Decode { table: "search_history", message };
        let id = Uuid::parse_str(&self.id).map_err(|e| decode(format!("id {}: {e}", self.id)))?;
        let status = SessionStatus::parse(&self.status).ok_or_else(|| decode(format!("status {}", self.status)))?;
        let stage = PipelineStage::parse(&self.stage).ok_or_else(|| decode(format!("stage {}", self.stage)))?;
        let translation = self.translation.as_deref().map(serde_json::from_str).transpose()?;
        Ok(SearchSession {
            id,
            keywords: self.keywords,
            description: self.description,
            status,
            stage,
            total_papers: self.total_papers.max(0) as usize,
            relevant_papers: self.relevant_papers.max(0) as usize,
            translation,
            error: self.error,
            created_at: parse_time(&self.created_at).map_err(decode)?,
            updated_at: parse_time(&self.updated_at).map_err(decode)?,
        })
    }
}

fn parse_time(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("timestamp {s}: {e}"))
}

// ── Writes ───────────────────────────────────────────────────────────────────

fn get_paper_sync(conn: &Connection, id: &str) -> Result<Option<Paper>> {
    let sql = format!("SELECT {PAPER_COLUMNS} FROM papers p WHERE p.id = ?1");
    conn.query_row(&sql, params![id], RawPaper::from_row)
        .optional()?
        .map(RawPaper::into_paper)
        .transpose()
}

fn upsert_paper_sync(conn: &Connection, paper: &Paper) -> Result<()> {
    let mut merged = paper.clone();
    if let Some(existing) = get_paper_sync(conn, &paper.id)? {
        merged.merge_from(&existing);
    }
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO papers (id, title, authors, year, abstract, doi, citation_count, url, venue,
                             fields_of_study, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             authors = excluded.authors,
             year = excluded.year,
             abstract = excluded.abstract,
             doi = excluded.doi,
             citation_count = excluded.citation_count,
             url = excluded.url,
             venue = excluded.venue,
             fields_of_study = excluded.fields_of_study,
             updated_at = excluded.updated_at",
        params![
            merged.id,
            merged.title,
            serde_json::to_string(&merged.authors)?,
            merged.year,
            merged.abstract_text,
            merged.doi,
            merged.citation_count as i64,
            merged.url,
            merged.venue,
            serde_json::to_string(&merged.fields_of_study)?,
            merged.source.as_str(),
            now,
        ],
    )?;
    Ok(())
}

fn upsert_session_sync(conn: &Connection, session: &SearchSession) -> Result<usize> {
    let translation = session.translation.as_ref().map(serde_json::to_string).transpose()?;
    Ok(conn.execute(
        "INSERT INTO search_history (id, keywords, description, status, stage, total_papers,
                                     relevant_papers, translation, error, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
             status = excluded.status,
             stage = excluded.stage,
             total_papers = excluded.total_papers,
             relevant_papers = excluded.relevant_papers,
             translation = excluded.translation,
             error = excluded.error,
             updated_at = excluded.updated_at",
        params![
            session.id.to_string(),
            session.keywords,
            session.description,
            session.status.as_str(),
            session.stage.as_str(),
            session.total_papers as i64,
            session.relevant_papers as i64,
            translation,
            session.error,
            session.created_at.to_rfc3339(),
            session.updated_at.to_rfc3339(),
        ],
    )?)
}

#[async_trait]
impl PaperStore for SqliteStore {
    async fn upsert_paper(&self, paper: &Paper) -> Result<()> {
        let conn = self.conn()?;
        upsert_paper_sync(&conn, paper)
    }

    #[instrument(skip(self, papers), fields(n = papers.len()))]
    async fn upsert_papers(&self, papers: &[Paper]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for paper in papers {
            upsert_paper_sync(&tx, paper)?;
        }
        tx.commit()?;
        debug!(n = papers.len(), "Papers upserted");
        Ok(papers.len())
    }

    async fn get_paper(&self, id: &str) -> Result<Option<Paper>> {
        let conn = self.conn()?;
        get_paper_sync(&conn, id)
    }

    async fn upsert_relationship(&self, rel: &Relationship) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO relationships (source_paper_id, target_paper_id, relationship_type, description)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(source_paper_id, target_paper_id) DO UPDATE SET
                 relationship_type = excluded.relationship_type,
                 description = excluded.description",
            params![rel.source_paper_id, rel.target_paper_id, rel.relationship_type.as_str(), rel.description],
        )?;
        Ok(())
    }

    async fn upsert_relationships(&self, rels: &[Relationship]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO relationships (source_paper_id, target_paper_id, relationship_type, description)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(source_paper_id, target_paper_id) DO UPDATE SET
                     relationship_type = excluded.relationship_type,
                     description = excluded.description",
            )?;
            for rel in rels {
                stmt.execute(params![
                    rel.source_paper_id,
                    rel.target_paper_id,
                    rel.relationship_type.as_str(),
                    rel.description
                ])?;
            }
        }
        tx.commit()?;
        Ok(rels.len())
    }

    async fn relationships_among(&self, ids: &[String]) -> Result<Vec<Relationship>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let conn = self.conn()?;
        let mut out = Vec::new();
        // Chunked to stay under SQLite's bound-parameter limit.
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT source_paper_id, target_paper_id, relationship_type, description
                 FROM relationships WHERE source_paper_id IN ({placeholders})
                 ORDER BY rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok(Relationship {
                    source_paper_id: row.get(0)?,
                    target_paper_id: row.get(1)?,
                    relationship_type: RelationshipType::parse_lenient(&row.get::<_, String>(2)?),
                    description: row.get(3)?,
                })
            })?;
            for rel in rows {
                let rel = rel?;
                if wanted.contains(rel.target_paper_id.as_str()) {
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }

    async fn upsert_score(&self, score: &Score) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO paper_scores (search_id, paper_id, priority, matched_keywords, domain_match, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(search_id, paper_id) DO UPDATE SET
                 priority = excluded.priority,
                 matched_keywords = excluded.matched_keywords,
                 domain_match = excluded.domain_match,
                 reason = excluded.reason",
            params![
                score.search_id.to_string(),
                score.paper_id,
                score.priority as i64,
                serde_json::to_string(&score.matched_keywords)?,
                score.domain_match.as_str(),
                score.reason,
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn scored_papers(&self, search_id: Uuid, min_priority: u8) -> Result<Vec<RankedPaper>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {PAPER_COLUMNS}, s.priority, s.matched_keywords, s.domain_match, s.reason
             FROM paper_scores s JOIN papers p ON p.id = s.paper_id
             WHERE s.search_id = ?1 AND s.priority >= ?2
             ORDER BY s.priority DESC, p.citation_count DESC, s.rowid ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![search_id.to_string(), min_priority as i64], |row| {
            Ok((RawPaper::from_row(row)?, RawScore::from_row(row, 11)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (raw_paper, raw_score) = row?;
            let paper = raw_paper.into_paper()?;
            let score = raw_score.into_score(search_id, &paper.id)?;
            out.push(RankedPaper { paper, score });
        }
        debug!(n = out.len(), min_priority, "Loaded scored papers");
        Ok(out)
    }

    async fn create_session(&self, session: &SearchSession) -> Result<()> {
        let conn = self.conn()?;
        upsert_session_sync(&conn, session)?;
        Ok(())
    }

    async fn update_session(&self, session: &SearchSession) -> Result<()> {
        let conn = self.conn()?;
        let exists: bool = conn
            .query_row("SELECT 1 FROM search_history WHERE id = ?1", params![session.id.to_string()], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(format!("session {}", session.id)));
        }
        upsert_session_sync(&conn, session)?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<SearchSession>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM search_history WHERE id = ?1");
        conn.query_row(&sql, params![id.to_string()], RawSession::from_row)
            .optional()?
            .map(RawSession::into_session)
            .transpose()
    }

    async fn list_sessions(&self, limit: usize) -> Result<Vec<SearchSession>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM search_history ORDER BY created_at DESC, rowid DESC LIMIT ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], RawSession::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_session()?);
        }
        Ok(out)
    }
}
