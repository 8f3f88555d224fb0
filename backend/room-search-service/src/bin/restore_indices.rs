/// Create missing search indices and backfill them from the room store.
///
/// Same configuration as the service; runs the bootstrap once and exits.
/// Existing indices are left untouched.
///
/// Usage:
///   DATABASE_URL=postgres://... SEARCH_ENGINE_URL=http://... cargo run --bin restore-indices
use anyhow::{Context, Result};
use room_search_service::{
    config::Config,
    logging,
    services::{Bootstrapper, ElasticsearchClient, PgRoomStore},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let config = Config::from_env().context("Invalid configuration")?;

    info!("Connecting to PostgreSQL...");
    let store = PgRoomStore::connect(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let engine = ElasticsearchClient::new(&config.search_engine)
        .context("Failed to build search engine client")?;

    let bootstrapper = Bootstrapper::new(
        Arc::new(engine),
        Arc::new(store),
        config.indices.clone(),
        config.backfill_batch_size,
    );

    let report = bootstrapper.run().await.context("Restore failed")?;

    info!(
        created = ?report.created_indices,
        rooms = report.rooms_backfilled,
        messages = report.messages_backfilled,
        "Restore complete"
    );

    Ok(())
}
