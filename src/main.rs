//! mailsift - Entry point for the background sync daemon

use std::sync::Arc;

use anyhow::Context;
use mailsift::config::Settings;
use mailsift::providers::ai::{InferenceBackend, LlmInference};
use mailsift::providers::email::GmailMailbox;
use mailsift::realtime::{Broadcaster, Scheduler};
use mailsift::services::{CategoryService, SyncEngine};
use mailsift::storage::{Database, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::resolve().context("failed to read settings")?;
    settings.validate().context("invalid settings")?;
    tracing::info!(
        environment = %settings.server.environment,
        provider = ?settings.ai.provider,
        "starting mailsift"
    );

    let db = if settings.database.path == ":memory:" {
        Database::open_in_memory().await?
    } else {
        Database::open(&settings.database.path)
            .await
            .with_context(|| format!("failed to open {}", settings.database.path))?
    };
    let store = Arc::new(SqliteStore::new(db));

    let seeded = CategoryService::new(store.clone())
        .seed_from(None)
        .await
        .context("failed to seed categories")?;
    if seeded > 0 {
        tracing::info!(seeded, "initialized categories");
    }

    let backend = InferenceBackend::from_settings(&settings.ai)?;
    let inference =
        Arc::new(LlmInference::new(Arc::new(backend)).with_temperature(settings.ai.temperature));
    let mailbox = Arc::new(GmailMailbox::new());

    let engine = Arc::new(
        SyncEngine::new(store.clone(), store.clone(), store.clone(), mailbox, inference)
            .with_concurrency(settings.sync.concurrency)
            .with_max_fetch(settings.sync.max_fetch),
    );
    let broadcaster = Arc::new(Broadcaster::new(&settings.realtime));
    let scheduler = Arc::new(Scheduler::new(
        engine,
        store,
        broadcaster.clone(),
        &settings.sync,
    ));

    let handle = scheduler.clone().spawn();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");

    scheduler.stop();
    broadcaster.close().await;
    if let Err(e) = handle.await {
        tracing::error!("scheduler task failed: {}", e);
    }

    Ok(())
}
