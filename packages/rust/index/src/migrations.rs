//! SQL migration definitions for the embedding index database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: collections, entries",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Collection metadata: which embedding model produced the vectors and at
-- what dimension. Checked on open so a mismatch fails before first query.
CREATE TABLE IF NOT EXISTS collections (
    name        TEXT PRIMARY KEY,
    embed_model TEXT NOT NULL,
    dimension   INTEGER NOT NULL,
    created_at  TEXT NOT NULL
);

-- Index entries: one chunk + embedding per row. The unique key makes
-- re-ingestion an upsert instead of unbounded growth.
CREATE TABLE IF NOT EXISTS entries (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    collection     TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    source_url     TEXT NOT NULL,
    sequence_index INTEGER NOT NULL,
    text           TEXT NOT NULL,
    char_start     INTEGER NOT NULL,
    char_end       INTEGER NOT NULL,
    content_hash   TEXT NOT NULL,
    embedding      BLOB NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE(collection, source_url, sequence_index)
);

CREATE INDEX IF NOT EXISTS idx_entries_collection ON entries(collection);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
