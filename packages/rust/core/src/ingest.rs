//! Offline ingestion pipeline: crawl → segment → embed → upsert.
//!
//! Runs once to populate the embedding index. Re-running against unchanged
//! content is a no-op beyond the first application: unchanged chunks are
//! detected by content hash and skipped before embedding, and the index
//! upsert is keyed so duplicates cannot accumulate.

use std::time::Instant;

use tracing::{info, instrument};
use url::Url;

use deskbot_crawler::Crawler;
use deskbot_index::EmbeddingIndex;
use deskbot_llm::EmbeddingModel;
use deskbot_shared::{DeskbotError, Result};
use deskbot_text::Segmenter;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as chunks are embedded and indexed.
    fn chunk_indexed(&self, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &IngestResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn chunk_indexed(&self, _current: usize, _total: usize) {}
    fn done(&self, _result: &IngestResult) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Result of one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestResult {
    /// Documents fetched by the crawl.
    pub documents: usize,
    /// Chunks produced by segmentation.
    pub chunks: usize,
    /// Chunks embedded and upserted this run.
    pub entries_upserted: usize,
    /// Chunks skipped because their content was already indexed unchanged.
    pub chunks_unchanged: usize,
    /// Total entries in the collection after the run.
    pub entry_count: usize,
    /// Fetch errors tolerated during the crawl.
    pub crawl_errors: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Composes crawler → segmenter → embedding oracle → index upsert.
pub struct IngestionPipeline<'a> {
    crawler: Crawler,
    segmenter: Segmenter,
    embedder: &'a dyn EmbeddingModel,
    index: &'a EmbeddingIndex,
    collection: &'a str,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        crawler: Crawler,
        segmenter: Segmenter,
        embedder: &'a dyn EmbeddingModel,
        index: &'a EmbeddingIndex,
        collection: &'a str,
    ) -> Self {
        Self {
            crawler,
            segmenter,
            embedder,
            index,
            collection,
        }
    }

    /// Run the full ingestion pipeline from `seed`.
    #[instrument(skip_all, fields(seed = %seed, collection = %self.collection))]
    pub async fn run(&self, seed: &Url, progress: &dyn ProgressReporter) -> Result<IngestResult> {
        let start = Instant::now();

        // --- Phase 1: Crawl ---
        progress.phase("Crawling help center");
        let crawl = self.crawler.crawl(seed).await?;

        // --- Phase 2: Segment ---
        progress.phase("Segmenting documents");
        let chunks: Vec<_> = crawl
            .documents
            .iter()
            .flat_map(|doc| self.segmenter.segment(doc))
            .collect();

        if chunks.is_empty() {
            return Err(DeskbotError::validation(
                "crawled pages produced no text chunks",
            ));
        }

        info!(
            documents = crawl.documents.len(),
            chunks = chunks.len(),
            "segmentation complete"
        );

        // --- Phase 3: Embed & index ---
        progress.phase("Embedding and indexing");

        // If the collection already exists it must have been built with the
        // same embedding model; open_collection re-checks the dimension once
        // the first vector arrives.
        if let Some((stored_model, _)) = self.index.collection_meta(self.collection).await? {
            if stored_model != self.embedder.model_name() {
                return Err(DeskbotError::config(format!(
                    "collection '{}' was built with embedding model '{stored_model}', \
                     but '{}' is configured",
                    self.collection,
                    self.embedder.model_name()
                )));
            }
        }

        let total = chunks.len();
        let mut entries_upserted = 0usize;
        let mut chunks_unchanged = 0usize;
        let mut collection_opened = false;

        for (i, chunk) in chunks.iter().enumerate() {
            progress.chunk_indexed(i + 1, total);

            if collection_opened || self.collection_exists().await? {
                if self.index.has_unchanged(self.collection, chunk).await? {
                    chunks_unchanged += 1;
                    continue;
                }
            }

            let embedding = self.embedder.embed(&chunk.text).await?;

            if !collection_opened {
                self.index
                    .open_collection(self.collection, self.embedder.model_name(), embedding.len())
                    .await?;
                collection_opened = true;
            }

            self.index
                .upsert(self.collection, chunk, &embedding)
                .await?;
            entries_upserted += 1;
        }

        let entry_count = self.index.entry_count(self.collection).await?;

        let result = IngestResult {
            documents: crawl.documents.len(),
            chunks: total,
            entries_upserted,
            chunks_unchanged,
            entry_count,
            crawl_errors: crawl.errors.len(),
            elapsed: start.elapsed(),
        };

        progress.done(&result);

        info!(
            documents = result.documents,
            chunks = result.chunks,
            entries_upserted = result.entries_upserted,
            chunks_unchanged = result.chunks_unchanged,
            entry_count = result.entry_count,
            elapsed_ms = result.elapsed.as_millis(),
            "ingestion complete"
        );

        Ok(result)
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.index.collection_meta(self.collection).await?.is_some())
    }
}
