//! Schema migrations, tracked through `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

const V001_INITIAL: &str = "
CREATE TABLE IF NOT EXISTS papers (
    id              TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    authors         TEXT NOT NULL DEFAULT '[]',
    year            INTEGER,
    abstract        TEXT,
    doi             TEXT,
    citation_count  INTEGER NOT NULL DEFAULT 0,
    url             TEXT,
    venue           TEXT,
    fields_of_study TEXT NOT NULL DEFAULT '[]',
    source          TEXT NOT NULL DEFAULT 'unknown',
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_papers_doi ON papers(doi);

CREATE TABLE IF NOT EXISTS relationships (
    source_paper_id   TEXT NOT NULL,
    target_paper_id   TEXT NOT NULL,
    relationship_type TEXT NOT NULL DEFAULT 'cites',
    description       TEXT,
    PRIMARY KEY (source_paper_id, target_paper_id)
);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_paper_id);

CREATE TABLE IF NOT EXISTS search_history (
    id              TEXT PRIMARY KEY,
    keywords        TEXT NOT NULL,
    description     TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL,
    stage           TEXT NOT NULL,
    total_papers    INTEGER NOT NULL DEFAULT 0,
    relevant_papers INTEGER NOT NULL DEFAULT 0,
    translation     TEXT,
    error           TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS paper_scores (
    search_id        TEXT NOT NULL,
    paper_id         TEXT NOT NULL,
    priority         INTEGER NOT NULL,
    matched_keywords TEXT NOT NULL DEFAULT '[]',
    domain_match     TEXT NOT NULL DEFAULT 'general',
    reason           TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (search_id, paper_id)
);
CREATE INDEX IF NOT EXISTS idx_paper_scores_priority ON paper_scores(search_id, priority);
";

/// Ordered `(version, sql)` pairs. Append only.
const MIGRATIONS: &[(u32, &str)] = &[(1, V001_INITIAL)];

pub const LATEST_VERSION: u32 = 1;

pub fn current_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Apply every migration newer than the database's `user_version`.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    let start = current_version(conn)?;
    let mut version = start;
    for (target, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > start) {
        conn.execute_batch(&format!("BEGIN;\n{sql}\nPRAGMA user_version = {target};\nCOMMIT;"))?;
        info!(from = version, to = target, "Applied schema migration");
        version = *target;
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_once() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
        assert_eq!(run_migrations(&conn).unwrap(), LATEST_VERSION);
        assert_eq!(run_migrations(&conn).unwrap(), LATEST_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('papers', 'relationships', 'search_history', 'paper_scores')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_migrations_skip_applied_versions() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", LATEST_VERSION).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), LATEST_VERSION);

        // Already at the latest version: V001 must not have run.
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'papers'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(tables, 0);
    }
}
