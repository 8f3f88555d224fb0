use actix_web::{web, App, HttpServer};
use room_search_service::{
    config, error, events::kafka::spawn_room_event_consumer, logging, routes,
    services::{ElasticsearchClient, PgRoomStore},
    state::AppState,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let store = PgRoomStore::connect(&cfg.database_url, cfg.database_max_connections)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
    let engine = ElasticsearchClient::new(&cfg.search_engine)
        .map_err(|e| error::AppError::StartServer(format!("search engine: {e}")))?;

    let state = AppState::new(cfg.clone(), Arc::new(engine), Arc::new(store));

    if cfg.bootstrap_on_startup {
        // A failed bootstrap leaves the service usable; operators rerun it
        // through POST /opensearch/restore.
        if let Err(e) = state.bootstrapper.run().await {
            tracing::error!(error = ?e, "startup index bootstrap failed");
        }
    } else {
        tracing::info!("startup index bootstrap disabled");
    }

    let _consumer = match cfg.kafka.clone() {
        Some(kafka) => Some(spawn_room_event_consumer(state.sync.clone(), kafka)),
        None => {
            tracing::warn!("KAFKA_BROKERS not set; room events will not be indexed");
            None
        }
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting room-search-service");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}
