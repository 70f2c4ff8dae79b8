//! The online `ask` path: sanitize → route → dispatch → response + trace.
//!
//! One synchronous request/response per message. Decision log records
//! bracket the downstream agent call — one before dispatch with the router's
//! decision, one after the agent returns with its elapsed time — so the
//! measured time covers only the agent itself.

use std::time::Instant;

use tracing::{info, instrument};

use deskbot_agents::{Agent, KnowledgeAgent, MathAgent, Router};
use deskbot_index::EmbeddingIndex;
use deskbot_llm::{CompletionModel, EmbeddingModel};
use deskbot_shared::{AgentKind, Result, Route, RoutingDecision, WorkflowStep, sanitize_text};

/// Log records cap the echoed message at this many characters.
const PROCESSED_CONTENT_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Request context & outcome
// ---------------------------------------------------------------------------

/// Caller identity attached to log records.
#[derive(Debug, Clone)]
pub struct AskContext {
    pub user_id: String,
    pub conversation_id: String,
}

/// The response shape the `/chat` boundary maps onto directly.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AskOutcome {
    /// Final user-facing response.
    pub response: String,
    /// The downstream agent's raw response.
    pub source_agent_response: String,
    /// Ordered agent trace for this request.
    pub agent_workflow: Vec<WorkflowStep>,
    /// The routing decision, for diagnostics.
    #[serde(skip)]
    pub decision: RoutingDecision,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Routes one message and dispatches it to the chosen agent.
pub struct AskPipeline<'a> {
    completion: &'a dyn CompletionModel,
    embedder: &'a dyn EmbeddingModel,
    index: &'a EmbeddingIndex,
    collection: &'a str,
    retrieval_k: usize,
}

impl<'a> AskPipeline<'a> {
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

    /// Answer one message, optionally forcing a route.
    #[instrument(skip_all, fields(user_id = %ctx.user_id, conversation_id = %ctx.conversation_id))]
    pub async fn ask(
        &self,
        message: &str,
        forced: Option<Route>,
        ctx: &AskContext,
    ) -> Result<AskOutcome> {
        let sanitized = sanitize_text(message);

        let router_start = Instant::now();
        let decision = Router.route(&sanitized, forced);
        let router_elapsed = router_start.elapsed();

        let downstream: AgentKind = decision.route.into();
        emit_log_record(
            AgentKind::Router,
            ctx,
            router_elapsed.as_secs_f64() * 1000.0,
            Some(downstream.as_str()),
            &sanitized,
        );

        let agent = match decision.route {
            Route::Math => Agent::Math(MathAgent::new()),
            Route::Knowledge => Agent::Knowledge(KnowledgeAgent::new(
                self.completion,
                self.embedder,
                self.index,
                self.collection,
                self.retrieval_k,
            )),
        };

        let agent_start = Instant::now();
        let reply = agent.handle(&sanitized).await?;
        let agent_elapsed = agent_start.elapsed();

        emit_log_record(
            agent.kind(),
            ctx,
            agent_elapsed.as_secs_f64() * 1000.0,
            None,
            &sanitized,
        );

        let agent_workflow = vec![
            WorkflowStep {
                agent: AgentKind::Router.as_str().to_string(),
                decision: Some(downstream.as_str().to_string()),
            },
            WorkflowStep {
                agent: agent.kind().as_str().to_string(),
                decision: None,
            },
        ];

        Ok(AskOutcome {
            response: reply.text.clone(),
            source_agent_response: reply.text,
            agent_workflow,
            decision,
        })
    }
}

/// Emit one structured log record for an agent invocation.
fn emit_log_record(
    agent: AgentKind,
    ctx: &AskContext,
    execution_time_ms: f64,
    decision: Option<&str>,
    content: &str,
) {
    let processed_content: String = content.chars().take(PROCESSED_CONTENT_LIMIT).collect();

    match decision {
        Some(decision) => info!(
            agent = agent.as_str(),
            conversation_id = %ctx.conversation_id,
            user_id = %ctx.user_id,
            execution_time_ms,
            decision,
            processed_content = %processed_content,
            "agent invocation"
        ),
        None => info!(
            agent = agent.as_str(),
            conversation_id = %ctx.conversation_id,
            user_id = %ctx.user_id,
            execution_time_ms,
            processed_content = %processed_content,
            "agent invocation"
        ),
    }
}
