//! Deskbot CLI — agent-routed support assistant.
//!
//! Routes questions between a math evaluator and a RAG answerer over a
//! crawled help-center knowledge base.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
