//! Shared configuration, error, and domain types for Deskbot.
//!
//! Everything here is dependency-light so every other crate in the
//! workspace can build on it without cycles.

pub mod config;
pub mod error;
pub mod sanitize;
pub mod types;

pub use config::{
    AppConfig, ChunkingConfig, CrawlConfig, IndexConfig, ModelsConfig, RetrievalConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{DeskbotError, Result};
pub use sanitize::sanitize_text;
pub use types::{
    AgentKind, CharSpan, Chunk, Document, RetrievedChunk, Route, RoutingDecision, WorkflowStep,
};
