//! Core domain types for the Deskbot pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A crawled page reduced to prose text. Produced by the crawler, consumed
/// once by the segmenter; not persisted beyond the ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Original page URL.
    pub url: String,
    /// Extracted prose content (markup and chrome stripped).
    pub raw_text: String,
    /// When the page was fetched.
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// Half-open character range of a chunk within its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
}

/// A bounded, overlapping segment of a source document — the retrieval unit.
///
/// Chunks from one document form a contiguous, overlapping cover of its
/// text. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// URL of the document this chunk came from.
    pub source_url: String,
    /// Position of this chunk within its document (0-based).
    pub sequence_index: u32,
    /// The chunk text.
    pub text: String,
    /// Character range within the source document's text.
    pub char_span: CharSpan,
    /// SHA-256 of `text`; lets re-ingestion skip unchanged chunks.
    pub content_hash: String,
}

impl Chunk {
    /// Build a chunk, computing its content hash.
    pub fn new(source_url: &str, sequence_index: u32, text: String, char_span: CharSpan) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let content_hash = format!("{:x}", hasher.finalize());
        Self {
            source_url: source_url.to_string(),
            sequence_index,
            text,
            char_span,
            content_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// The two downstream routes a message can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Math,
    Knowledge,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Math => write!(f, "math"),
            Route::Knowledge => write!(f, "knowledge"),
        }
    }
}

impl std::str::FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "math" => Ok(Route::Math),
            "knowledge" => Ok(Route::Knowledge),
            other => Err(format!("unknown route '{other}': expected 'math' or 'knowledge'")),
        }
    }
}

/// Per-request routing decision, appended to the response trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The (sanitized) message that was classified.
    pub message: String,
    /// Chosen downstream route.
    pub route: Route,
    /// Human-readable reason for the choice.
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Agents & workflow trace
// ---------------------------------------------------------------------------

/// The agents that appear in decision logs and workflow traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Router,
    Math,
    Knowledge,
}

impl AgentKind {
    /// Name used in log records and the `agent_workflow` trace.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Router => "RouterAgent",
            AgentKind::Math => "MathAgent",
            AgentKind::Knowledge => "KnowledgeAgent",
        }
    }
}

impl From<Route> for AgentKind {
    fn from(route: Route) -> Self {
        match route {
            Route::Math => AgentKind::Math,
            Route::Knowledge => AgentKind::Knowledge,
        }
    }
}

/// One entry of the ordered `agent_workflow` list returned per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Agent name (e.g. "RouterAgent").
    pub agent: String,
    /// The router's decision, present only on the router step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

/// A retrieved chunk with its similarity to the query vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}
