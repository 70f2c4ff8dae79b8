//! Response agents and the routing decision procedure.
//!
//! This crate provides:
//! - [`Router`] — deterministic math/knowledge classification
//! - [`MathAgent`] / [`MathEvaluator`] — safe natural-language arithmetic
//! - [`KnowledgeAgent`] — RAG answering over the embedding index
//! - [`Agent`] — closed dispatch over the two downstream agents

pub mod knowledge;
pub mod math;
pub mod router;

pub use knowledge::{EMPTY_INDEX_FALLBACK, KnowledgeAgent, KnowledgeAnswer};
pub use math::{DerivationStep, MathError, MathEvaluator, MathOutcome};
pub use router::Router;

use deskbot_shared::{AgentKind, Result, RetrievedChunk};

// ---------------------------------------------------------------------------
// Agent dispatch
// ---------------------------------------------------------------------------

/// Reply produced by a downstream agent.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// User-facing response text.
    pub text: String,
    /// Context that grounded the reply (empty for math).
    pub retrieved_context: Vec<RetrievedChunk>,
}

/// The math agent: evaluation plus user-facing rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathAgent {
    evaluator: MathEvaluator,
}

impl MathAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the message. Math failures are user-level outcomes, so they
    /// come back as readable text rather than an error.
    pub fn handle(&self, message: &str) -> AgentReply {
        let text = match self.evaluator.evaluate(message) {
            Ok(outcome) => self.evaluator.render(&outcome),
            Err(err) => self.evaluator.render_error(&err),
        };
        AgentReply {
            text,
            retrieved_context: Vec::new(),
        }
    }
}

/// Closed tagged-variant dispatch over the downstream agents, selected by
/// the router's decision.
pub enum Agent<'a> {
    Math(MathAgent),
    Knowledge(KnowledgeAgent<'a>),
}

impl Agent<'_> {
    /// Which agent this is, for logs and the workflow trace.
    pub fn kind(&self) -> AgentKind {
        match self {
            Agent::Math(_) => AgentKind::Math,
            Agent::Knowledge(_) => AgentKind::Knowledge,
        }
    }

    /// Handle a message with this agent.
    pub async fn handle(&self, message: &str) -> Result<AgentReply> {
        match self {
            Agent::Math(agent) => Ok(agent.handle(message)),
            Agent::Knowledge(agent) => {
                let answer = agent.answer(message).await?;
                Ok(AgentReply {
                    text: answer.response_text,
                    retrieved_context: answer.retrieved_context,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_agent_answers_inline() {
        let reply = MathAgent::new().handle("Quanto é 25 x 4 + 10?");
        assert!(reply.text.contains("Resultado: 110"));
        assert!(reply.retrieved_context.is_empty());
    }

    #[test]
    fn math_agent_reports_errors_as_text() {
        let reply = MathAgent::new().handle("10 / 0");
        assert!(reply.text.contains("zero"));

        let reply = MathAgent::new().handle("oi, tudo bem?");
        assert!(reply.text.contains("Não encontrei"));
    }

    #[tokio::test]
    async fn agent_enum_reports_kind_and_dispatches() {
        let agent = Agent::Math(MathAgent::new());
        assert_eq!(agent.kind(), AgentKind::Math);

        let reply = agent.handle("2 + 2").await.unwrap();
        assert!(reply.text.contains("Resultado: 4"));
    }
}
