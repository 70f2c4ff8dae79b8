//! End-to-end pipelines: offline ingestion and the online `ask` path.

pub mod ask;
pub mod ingest;

pub use ask::{AskContext, AskOutcome, AskPipeline};
pub use ingest::{IngestResult, IngestionPipeline, ProgressReporter, SilentProgress};
