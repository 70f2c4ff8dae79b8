//! RAG answering over the embedding index.
//!
//! The query is embedded with the same oracle used at ingestion (enforced
//! against the collection metadata), the top-k chunks are retrieved, and a
//! grounded prompt — retrieved chunk text plus the query, nothing else — is
//! sent to the completion oracle. An empty index short-circuits to a fixed
//! fallback without ever calling the oracle.

use tracing::{debug, instrument, warn};

use deskbot_index::EmbeddingIndex;
use deskbot_llm::{CompletionModel, EmbeddingModel};
use deskbot_shared::{DeskbotError, Result, RetrievedChunk};

/// Deterministic reply when retrieval finds nothing.
pub const EMPTY_INDEX_FALLBACK: &str =
    "Desculpe, não encontrei informações relevantes na base de conhecimento. \
     Execute a ingestão com `deskbot ingest` e tente novamente.";

/// A knowledge answer with the context that grounded it.
#[derive(Debug, Clone)]
pub struct KnowledgeAnswer {
    /// Final response text (with appended sources when available).
    pub response_text: String,
    /// Retrieved context, best match first.
    pub retrieved_context: Vec<RetrievedChunk>,
}

/// Answers questions grounded in the crawled knowledge base.
pub struct KnowledgeAgent<'a> {
    completion: &'a dyn CompletionModel,
    embedder: &'a dyn EmbeddingModel,
    index: &'a EmbeddingIndex,
    collection: &'a str,
    retrieval_k: usize,
}

impl<'a> KnowledgeAgent<'a> {
    pub fn new(
        completion: &'a dyn CompletionModel,
        embedder: &'a dyn EmbeddingModel,
        index: &'a EmbeddingIndex,
        collection: &'a str,
        retrieval_k: usize,
    ) -> Self {
        Self {
            completion,
            embedder,
            index,
            collection,
            retrieval_k,
        }
    }

    /// Answer a query via retrieval-augmented generation.
    #[instrument(skip_all, fields(collection = %self.collection, k = self.retrieval_k))]
    pub async fn answer(&self, query: &str) -> Result<KnowledgeAnswer> {
        // An uninitialized index is a normal state, not an error: nothing
        // was ingested yet.
        let Some((stored_model, _dimension)) = self.index.collection_meta(self.collection).await?
        else {
            warn!(collection = %self.collection, "collection does not exist yet");
            return Ok(KnowledgeAnswer {
                response_text: EMPTY_INDEX_FALLBACK.to_string(),
                retrieved_context: Vec::new(),
            });
        };

        // Query-time embeddings must come from the ingestion-time model;
        // anything else silently degrades retrieval quality.
        if stored_model != self.embedder.model_name() {
            return Err(DeskbotError::config(format!(
                "collection '{}' was ingested with embedding model '{stored_model}', \
                 but queries are configured to use '{}'",
                self.collection,
                self.embedder.model_name()
            )));
        }

        let query_vector = self
            .embedder
            .embed(query)
            .await
            .map_err(knowledge_unavailable)?;

        let retrieved = self
            .index
            .search(self.collection, &query_vector, self.retrieval_k)
            .await?;

        if retrieved.is_empty() {
            debug!("retrieval returned no chunks, using fallback");
            return Ok(KnowledgeAnswer {
                response_text: EMPTY_INDEX_FALLBACK.to_string(),
                retrieved_context: Vec::new(),
            });
        }

        let prompt = build_grounded_prompt(query, &retrieved);
        let answer = self
            .completion
            .complete(&prompt)
            .await
            .map_err(knowledge_unavailable)?;

        let response_text = append_sources(answer.trim(), &retrieved);

        Ok(KnowledgeAnswer {
            response_text,
            retrieved_context: retrieved,
        })
    }
}

/// Convert oracle transport failures into the caller-facing unavailability
/// error, keeping it distinct from "no results found".
fn knowledge_unavailable(err: DeskbotError) -> DeskbotError {
    match err {
        DeskbotError::Oracle(detail) => DeskbotError::KnowledgeUnavailable(detail),
        other => other,
    }
}

/// Build the grounding prompt: numbered chunks with their sources, then the
/// query. No prior conversation is injected, which bounds the
/// prompt-injection surface to the retrieved corpus itself.
fn build_grounded_prompt(query: &str, retrieved: &[RetrievedChunk]) -> String {
    let context = retrieved
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] Fonte: {}\n{}", i + 1, r.chunk.source_url, r.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "Você é um assistente de suporte da InfinitePay. Responda em português do Brasil.\n\
         Use APENAS as informações do contexto ao responder. Se não houver contexto \
         suficiente, diga que não sabe.\n\n\
         Pergunta do usuário:\n{query}\n\n\
         Contexto (trechos relevantes de artigos da Central de Ajuda):\n{context}\n\n\
         Instruções:\n\
         - Seja direto e prático.\n\
         - Se a pergunta não se relacionar à InfinitePay, diga que está fora do escopo.\n\
         Resposta:"
    )
}

/// Append the unique source URLs of the retrieved chunks, best match first.
fn append_sources(answer: &str, retrieved: &[RetrievedChunk]) -> String {
    let mut sources: Vec<&str> = Vec::new();
    for r in retrieved {
        let url = r.chunk.source_url.as_str();
        if !sources.contains(&url) {
            sources.push(url);
        }
    }

    if sources.is_empty() {
        return answer.to_string();
    }

    let list = sources
        .iter()
        .map(|u| format!("- {u}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{answer}\n\nFontes:\n{list}")
}
