//! libSQL-backed embedding index.
//!
//! [`EmbeddingIndex`] persists chunk embeddings under a collection name and
//! answers nearest-neighbor queries by cosine similarity. Upserts are
//! idempotent per `(source_url, sequence_index)`; collection metadata pins
//! the embedding model and dimension so a mismatch fails fast at open time
//! instead of silently returning empty results.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use deskbot_shared::{CharSpan, Chunk, DeskbotError, Result, RetrievedChunk};

/// Embedding index handle wrapping a libSQL database.
pub struct EmbeddingIndex {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl EmbeddingIndex {
    /// Open or create the index database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DeskbotError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        let index = Self { db, conn };
        index.run_migrations().await?;
        Ok(index)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DeskbotError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Collection operations
    // -----------------------------------------------------------------------

    /// Open a collection for use with the given embedding model/dimension,
    /// creating it on first use.
    ///
    /// If the collection already exists with a different model or dimension
    /// this fails immediately — ingestion and query must embed with the same
    /// oracle, and a silently degraded search is worse than an error.
    pub async fn open_collection(
        &self,
        name: &str,
        embed_model: &str,
        dimension: usize,
    ) -> Result<()> {
        if let Some((stored_model, stored_dim)) = self.collection_meta(name).await? {
            if stored_model != embed_model {
                return Err(DeskbotError::validation(format!(
                    "collection '{name}' was built with embedding model '{stored_model}', \
                     but '{embed_model}' is configured; re-ingest or restore the model"
                )));
            }
            if stored_dim != dimension {
                return Err(DeskbotError::validation(format!(
                    "collection '{name}' stores {stored_dim}-dimensional vectors, \
                     but the configured model produces {dimension}"
                )));
            }
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO collections (name, embed_model, dimension, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, embed_model, dimension as i64, now.as_str()],
            )
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        debug!(collection = name, embed_model, dimension, "collection created");
        Ok(())
    }

    /// Get a collection's `(embed_model, dimension)`, if it exists.
    pub async fn collection_meta(&self, name: &str) -> Result<Option<(String, usize)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT embed_model, dimension FROM collections WHERE name = ?1",
                params![name],
            )
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let model = row
                    .get::<String>(0)
                    .map_err(|e| DeskbotError::Storage(e.to_string()))?;
                let dim = row
                    .get::<i64>(1)
                    .map_err(|e| DeskbotError::Storage(e.to_string()))?;
                Ok(Some((model, dim as usize)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DeskbotError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Entry operations
    // -----------------------------------------------------------------------

    /// Insert or update an entry, keyed by `(source_url, sequence_index)`.
    /// Re-ingesting identical content leaves the index unchanged in size.
    pub async fn upsert(&self, collection: &str, chunk: &Chunk, embedding: &[f32]) -> Result<()> {
        let (_, dimension) = self
            .collection_meta(collection)
            .await?
            .ok_or_else(|| DeskbotError::Storage(format!("unknown collection '{collection}'")))?;

        if embedding.len() != dimension {
            return Err(DeskbotError::validation(format!(
                "embedding dimension {} does not match collection '{collection}' dimension {dimension}",
                embedding.len()
            )));
        }

        let blob = encode_embedding(embedding);
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO entries
                   (collection, source_url, sequence_index, text, char_start, char_end,
                    content_hash, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(collection, source_url, sequence_index) DO UPDATE SET
                   text = excluded.text,
                   char_start = excluded.char_start,
                   char_end = excluded.char_end,
                   content_hash = excluded.content_hash,
                   embedding = excluded.embedding",
                params![
                    collection,
                    chunk.source_url.as_str(),
                    chunk.sequence_index as i64,
                    chunk.text.as_str(),
                    chunk.char_span.start as i64,
                    chunk.char_span.end as i64,
                    chunk.content_hash.as_str(),
                    blob,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Check whether an entry with this chunk's key already stores the same
    /// content hash — used to skip re-embedding unchanged chunks.
    pub async fn has_unchanged(&self, collection: &str, chunk: &Chunk) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT content_hash FROM entries
                 WHERE collection = ?1 AND source_url = ?2 AND sequence_index = ?3",
                params![
                    collection,
                    chunk.source_url.as_str(),
                    chunk.sequence_index as i64
                ],
            )
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let stored = row
                    .get::<String>(0)
                    .map_err(|e| DeskbotError::Storage(e.to_string()))?;
                Ok(stored == chunk.content_hash)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DeskbotError::Storage(e.to_string())),
        }
    }

    /// Number of entries stored under a collection.
    pub async fn entry_count(&self, collection: &str) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM entries WHERE collection = ?1",
                params![collection],
            )
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count = row
                    .get::<i64>(0)
                    .map_err(|e| DeskbotError::Storage(e.to_string()))?;
                Ok(count as usize)
            }
            _ => Ok(0),
        }
    }

    /// Top-`k` entries by cosine similarity to `query`, sorted descending.
    /// Ties keep insertion order (stable sort over rowid order).
    pub async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let (_, dimension) = self
            .collection_meta(collection)
            .await?
            .ok_or_else(|| DeskbotError::Storage(format!("unknown collection '{collection}'")))?;

        if query.len() != dimension {
            return Err(DeskbotError::validation(format!(
                "query embedding dimension {} does not match collection '{collection}' dimension {dimension}",
                query.len()
            )));
        }

        let mut rows = self
            .conn
            .query(
                "SELECT source_url, sequence_index, text, char_start, char_end,
                        content_hash, embedding
                 FROM entries WHERE collection = ?1 ORDER BY id",
                params![collection],
            )
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?;

        let mut scored: Vec<RetrievedChunk> = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DeskbotError::Storage(e.to_string()))?
        {
            let source_url = row
                .get::<String>(0)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;
            let sequence_index = row
                .get::<i64>(1)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;
            let text = row
                .get::<String>(2)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;
            let char_start = row
                .get::<i64>(3)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;
            let char_end = row
                .get::<i64>(4)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;
            let content_hash = row
                .get::<String>(5)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;
            let blob = row
                .get::<Vec<u8>>(6)
                .map_err(|e| DeskbotError::Storage(e.to_string()))?;

            let embedding = decode_embedding(&blob, dimension, &source_url, sequence_index)?;
            let similarity = cosine_similarity(query, &embedding);

            scored.push(RetrievedChunk {
                chunk: Chunk {
                    source_url,
                    sequence_index: sequence_index as u32,
                    text,
                    char_span: CharSpan {
                        start: char_start as usize,
                        end: char_end as usize,
                    },
                    content_hash,
                },
                similarity,
            });
        }

        // Stable sort preserves rowid (insertion) order among equal scores.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}

// ---------------------------------------------------------------------------
// Embedding codec
// ---------------------------------------------------------------------------

/// Encode an embedding as little-endian f32 bytes.
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode an embedding blob, failing loudly on corruption.
fn decode_embedding(
    blob: &[u8],
    dimension: usize,
    source_url: &str,
    sequence_index: i64,
) -> Result<Vec<f32>> {
    if blob.len() != dimension * 4 {
        return Err(DeskbotError::Storage(format!(
            "corrupt embedding for ({source_url}, {sequence_index}): \
             blob is {} bytes, expected {}",
            blob.len(),
            dimension * 4
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Cosine similarity between two equal-length vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbot_shared::CharSpan;

    fn chunk(url: &str, seq: u32, text: &str) -> Chunk {
        Chunk::new(
            url,
            seq,
            text.to_string(),
            CharSpan {
                start: 0,
                end: text.chars().count(),
            },
        )
    }

    async fn open_test_index() -> (EmbeddingIndex, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("deskbot-index-{}", uuid::Uuid::now_v7()));
        let path = dir.join("index.db");
        let index = EmbeddingIndex::open(&path).await.unwrap();
        (index, dir)
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_key() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "test-embed", 3).await.unwrap();

        let c = chunk("https://example.com/a", 0, "primeiro trecho");
        index.upsert("kb", &c, &[1.0, 0.0, 0.0]).await.unwrap();
        index.upsert("kb", &c, &[1.0, 0.0, 0.0]).await.unwrap();
        assert_eq!(index.entry_count("kb").await.unwrap(), 1);

        // Same key with changed content updates in place, no growth.
        let changed = chunk("https://example.com/a", 0, "trecho revisado");
        index.upsert("kb", &changed, &[0.0, 1.0, 0.0]).await.unwrap();
        assert_eq!(index.entry_count("kb").await.unwrap(), 1);

        let results = index.search("kb", &[0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.text, "trecho revisado");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn has_unchanged_detects_identical_content() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "test-embed", 3).await.unwrap();

        let c = chunk("https://example.com/a", 0, "conteúdo estável");
        assert!(!index.has_unchanged("kb", &c).await.unwrap());

        index.upsert("kb", &c, &[1.0, 0.0, 0.0]).await.unwrap();
        assert!(index.has_unchanged("kb", &c).await.unwrap());

        let changed = chunk("https://example.com/a", 0, "conteúdo novo");
        assert!(!index.has_unchanged("kb", &changed).await.unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn search_returns_descending_similarity_with_stable_ties() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "test-embed", 2).await.unwrap();

        index
            .upsert("kb", &chunk("https://example.com/a", 0, "a"), &[1.0, 0.0])
            .await
            .unwrap();
        index
            .upsert("kb", &chunk("https://example.com/b", 0, "b"), &[0.0, 1.0])
            .await
            .unwrap();
        // Same direction as the first entry: ties on similarity with it.
        index
            .upsert("kb", &chunk("https://example.com/c", 0, "c"), &[2.0, 0.0])
            .await
            .unwrap();

        let results = index.search("kb", &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        // Entries a and c both score 1.0; insertion order breaks the tie.
        assert_eq!(results[0].chunk.text, "a");
        assert_eq!(results[1].chunk.text, "c");
        assert_eq!(results[2].chunk.text, "b");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn search_caps_results_at_k() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "test-embed", 2).await.unwrap();

        for i in 0..5 {
            index
                .upsert(
                    "kb",
                    &chunk("https://example.com/page", i, &format!("trecho {i}")),
                    &[1.0, i as f32],
                )
                .await
                .unwrap();
        }

        let results = index.search("kb", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "test-embed", 3).await.unwrap();

        let c = chunk("https://example.com/a", 0, "x");
        let err = index.upsert("kb", &c, &[1.0, 0.0]).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));

        let err = index.search("kb", &[1.0, 0.0], 1).await.unwrap_err();
        assert!(err.to_string().contains("dimension"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn collection_model_mismatch_fails_fast() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "model-a", 3).await.unwrap();

        let err = index
            .open_collection("kb", "model-b", 3)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model-a"));

        let err = index.open_collection("kb", "model-a", 4).await.unwrap_err();
        assert!(err.to_string().contains("dimension") || err.to_string().contains("3"));

        // Matching metadata reopens cleanly.
        index.open_collection("kb", "model-a", 3).await.unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = std::env::temp_dir().join(format!("deskbot-index-{}", uuid::Uuid::now_v7()));
        let path = dir.join("index.db");

        {
            let index = EmbeddingIndex::open(&path).await.unwrap();
            index.open_collection("kb", "test-embed", 2).await.unwrap();
            index
                .upsert("kb", &chunk("https://example.com/a", 0, "persistente"), &[1.0, 0.0])
                .await
                .unwrap();
        }

        let reopened = EmbeddingIndex::open(&path).await.unwrap();
        reopened.open_collection("kb", "test-embed", 2).await.unwrap();
        assert_eq!(reopened.entry_count("kb").await.unwrap(), 1);
        let results = reopened.search("kb", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].chunk.text, "persistente");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn corrupt_embedding_blob_is_a_hard_error() {
        let (index, dir) = open_test_index().await;
        index.open_collection("kb", "test-embed", 3).await.unwrap();

        // Bypass the API to write a truncated blob.
        index
            .conn
            .execute(
                "INSERT INTO entries
                   (collection, source_url, sequence_index, text, char_start, char_end,
                    content_hash, embedding, created_at)
                 VALUES ('kb', 'https://example.com/bad', 0, 'x', 0, 1, 'h', ?1, 'now')",
                params![vec![0u8, 1, 2]],
            )
            .await
            .unwrap();

        let err = index.search("kb", &[1.0, 0.0, 0.0], 1).await.unwrap_err();
        assert!(err.to_string().contains("corrupt"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
