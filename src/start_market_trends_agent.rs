//! Startup helpers for the market trends agent binary.
//!
//! Local mode: `SQLite` memory, Ollama chat model, stdin prompt loop.

use std::process::ExitCode;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::agent::MarketTrendsAgent;
use crate::config::AgentConfig;
use crate::memory::provisioning::prune_duplicate_stores;
use crate::memory::service::SqliteMemoryService;

/// Command-line flag that prunes duplicate stores and exits.
pub const PRUNE_FLAG: &str = "--prune-duplicates";

/// Initialize tracing once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Run the binary.
///
/// # Returns
/// `ExitCode::SUCCESS` on a clean exit, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting Market Trends Agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::from_env();
    let prune = std::env::args().skip(1).any(|arg| arg == PRUNE_FLAG);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = if prune {
        rt.block_on(prune_stores(&config))
    } else {
        rt.block_on(chat_loop(&config))
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

async fn prune_stores(config: &AgentConfig) -> anyhow::Result<()> {
    config.memory.validate()?;
    let service = SqliteMemoryService::new(&config.memory.storage)
        .await
        .context("opening memory database")?;
    let report = prune_duplicate_stores(&service, &config.memory.store.name).await?;
    tracing::info!(
        kept = ?report.kept,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "Duplicate store pruning finished"
    );
    Ok(())
}

async fn chat_loop(config: &AgentConfig) -> anyhow::Result<()> {
    let mut agent = MarketTrendsAgent::from_config(config)
        .await
        .context("starting agent")?;
    tracing::info!(
        store_id = %agent.store().store_id(),
        session = %agent.session(),
        "Memory store resolved"
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(b"Market Trends Agent ready. Type 'exit' to quit.\n")
        .await?;

    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let text = match agent.respond(input).await {
            Ok(report) => report.reply,
            Err(e) => {
                tracing::error!("Turn failed: {e}");
                format!("Sorry, I could not complete that request: {e}")
            }
        };
        stdout.write_all(format!("\nAgent: {text}\n").as_bytes()).await?;
    }
    Ok(())
}
