//! contract-sync - reconciles a local contract file with the remote server.
//!
//! Runs a single sync cycle, or a periodic loop when
//! `CONTRACT_SYNC_INTERVAL_SECS` is set. The local store is read from and
//! written back to `CONTRACT_SYNC_DATA_FILE` after every cycle.

use std::path::Path;
use std::sync::Arc;

use contract_sync_client::{
    load_document, save_document, Config, ContractBook, HttpRemoteClient, LocalStore,
    MemoryStore, NetworkStatus, SyncOrchestrator,
};
use contract_sync_engine::SyncState;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contract_sync_client=debug,contract_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        api = %config.api_url,
        data_file = %config.data_file.display(),
        "Starting contract sync"
    );

    // Restore the local store
    let store = Arc::new(MemoryStore::new());
    store.import(load_document(&config.data_file).await?)?;
    let book = Arc::new(ContractBook::new(store)?);

    let remote = HttpRemoteClient::new(
        config.api_url.clone(),
        config.request_timeout,
        config.auth_token.clone(),
    )?;
    let orchestrator = Arc::new(SyncOrchestrator::new(
        book.clone(),
        Arc::new(remote),
        Arc::new(NetworkStatus::default()),
        config.sync_settings(),
    )?);

    orchestrator.subscribe(|event| {
        if let SyncState::Idle(Some(result)) = event.state {
            tracing::info!(result = ?result, "{}", event.summary.describe());
        }
    });

    let mut progress = orchestrator.upload_progress();
    tokio::spawn(async move {
        while let Some(update) = progress.recv().await {
            tracing::debug!(
                current = update.current,
                total = update.total,
                failed = update.errors,
                "Upload progress"
            );
        }
    });

    match config.sync_interval {
        None => {
            let summary = orchestrator.sync().await?;
            save(&book, &config.data_file).await?;
            println!("{}", summary.describe());
        }
        Some(interval) => {
            // Persist after every finished cycle
            let (_subscription, mut events) = orchestrator.subscribe_channel();
            let saver_book = book.clone();
            let data_file = config.data_file.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if matches!(event.state, SyncState::Idle(Some(_))) {
                        if let Err(e) = save(&saver_book, &data_file).await {
                            tracing::error!(error = %e, "Failed to save data file");
                        }
                    }
                }
            });

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let runner = orchestrator.clone();
            let periodic =
                tokio::spawn(async move { runner.run_periodic(interval, shutdown_rx).await });

            tracing::info!(interval_secs = interval.as_secs(), "Periodic sync started");
            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            let _ = shutdown_tx.send(true);
            periodic.await?;
            save(&book, &config.data_file).await?;
        }
    }

    Ok(())
}

async fn save(book: &ContractBook, path: &Path) -> contract_sync_client::Result<()> {
    save_document(path, &book.export()?).await
}
