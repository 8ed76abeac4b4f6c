//! Replays a synthetic conversation through the memory orchestrator and prints
//! what a cold read recovers after compaction.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use recall_memory::{
    FileMessageStore, InMemoryMessageStore, MemoryOrchestrator, Message, MessageStore,
    OrchestratorConfig, SessionKey,
};
use tracing::info;

#[derive(Debug, Parser)]
#[command(about = "Replay a conversation through Recall")]
struct Args {
    /// JSON config file; defaults plus `RECALL_*` overrides when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Journal directory for a durable store; in-memory when omitted.
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Session to write into.
    #[arg(long, default_value = "demo:conversation")]
    session: String,

    /// Number of turns to replay.
    #[arg(long, default_value_t = 60)]
    turns: usize,

    /// Messages requested by each read.
    #[arg(long, default_value_t = 10)]
    recent: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    recall_telemetry::init_tracing("info");
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => recall_config::load_from_path(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => recall_config::load_from_env()?,
    };

    let store: Arc<dyn MessageStore> = match &args.journal {
        Some(dir) => Arc::new(FileMessageStore::open(dir).await?),
        None => Arc::new(InMemoryMessageStore::new()),
    };

    let orchestrator = MemoryOrchestrator::builder(OrchestratorConfig::try_from(&config)?)
        .with_store(store)
        .build()?;

    let session = SessionKey::new(args.session.clone())?;
    for turn in 0..args.turns {
        let user = turn % 2 == 0;
        let content = if user {
            format!("question {turn}: how do we handle {} ?", topic(turn))
        } else {
            format!("answer {turn}: {} is handled by the {} team", topic(turn), team(turn))
        };
        orchestrator
            .append(Message::builder(session.clone(), content).user_authored(user).build())
            .await?;
    }
    info!(turns = args.turns, session = %session, "replayed conversation");

    let warm = orchestrator.load_recent(&session, args.recent).await?;
    info!(messages = warm.len(), "warm read served");

    orchestrator.cache().invalidate(&session);
    let cold = orchestrator.load_recent(&session, args.recent).await?;
    for message in &cold {
        info!(user = message.is_user_authored(), "{}", message.content());
    }

    let hits = orchestrator.search("billing", &session, 0.5).await?;
    info!(matches = hits.len(), "searched full transcript for `billing`");

    println!("{}", serde_json::to_string_pretty(&orchestrator.get_metrics())?);
    Ok(())
}

fn topic(turn: usize) -> &'static str {
    const TOPICS: [&str; 5] = ["billing", "deploys", "on-call", "retention", "oauth"];
    TOPICS[turn / 2 % TOPICS.len()]
}

fn team(turn: usize) -> &'static str {
    const TEAMS: [&str; 3] = ["platform", "payments", "identity"];
    TEAMS[turn % TEAMS.len()]
}
