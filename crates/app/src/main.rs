use std::sync::Arc;

use engine::{
    Engine, NobodyActive, Scheduler,
    store::{AccountStore, MemoryStore, SqlStore, copy_accounts},
};
use migration::{Migrator, MigratorTrait};

mod settings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "economy={level},engine={level},migration={level}",
            level = settings.app.level
        ))
        .init();

    let store = open_store(&settings.database.url).await?;

    if let Some(migration) = &settings.migration {
        tracing::info!("Found migration settings...");
        let source = open_store(&migration.source_url).await?;
        let copied = copy_accounts(source.as_ref(), store.as_ref(), migration.batch_size).await?;
        tracing::info!("imported {copied} accounts from {}", migration.source_url);
    }

    let engine = Engine::builder()
        .store(store)
        .settings(settings.economy)
        .build()?;
    let scheduler = Scheduler::start(
        engine.cache().clone(),
        &settings.cache,
        Arc::new(NobodyActive),
    );

    let mut events = engine.subscribe();
    let audit = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(
                account = %event.account,
                ledger = event.ledger.as_str(),
                cause = ?event.cause,
                "balance {} -> {}",
                event.old,
                event.new
            );
        }
    });

    tracing::info!("economy core running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down...");

    let report = scheduler.shutdown().await;
    drop(engine);
    // The event stream ends once the engine is gone.
    let _ = audit.await;

    if report.failed > 0 {
        return Err(format!("{} accounts were not saved", report.failed).into());
    }
    Ok(())
}

async fn open_store(url: &str) -> Result<Arc<dyn AccountStore>, BoxError> {
    if url == settings::MEMORY_URL {
        tracing::warn!("using the in-memory store, balances are lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(Arc::new(SqlStore::new(database)))
}
