//! Language-model oracle interface.
//!
//! The rest of the system treats text completion and embedding as black-box
//! capabilities behind [`CompletionModel`] and [`EmbeddingModel`], so tests
//! substitute deterministic stubs and production wires in [`OllamaClient`].

pub mod ollama;

use async_trait::async_trait;

use deskbot_shared::Result;

pub use ollama::OllamaClient;

/// Text-completion oracle: prompt in, completion out.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Complete the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Model identifier, for logs and diagnostics.
    fn model_name(&self) -> &str;
}

/// Embedding oracle: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed the given text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Model identifier. The index records this so that ingestion-time and
    /// query-time embeddings are guaranteed to come from the same model.
    fn model_name(&self) -> &str;
}
