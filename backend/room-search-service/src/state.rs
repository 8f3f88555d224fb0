use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    Bootstrapper, IndexSyncService, QueryService, RoomReadModel, SearchEngine,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<dyn SearchEngine>,
    pub store: Arc<dyn RoomReadModel>,
    pub sync: Arc<IndexSyncService>,
    pub query: Arc<QueryService>,
    pub bootstrapper: Arc<Bootstrapper>,
}

impl AppState {
    /// Wire the services on top of one engine and one read model.
    pub fn new(
        config: Arc<Config>,
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RoomReadModel>,
    ) -> Self {
        let sync = Arc::new(IndexSyncService::new(
            engine.clone(),
            store.clone(),
            config.indices.clone(),
            config.display_name_scope,
        ));
        let query = Arc::new(QueryService::new(
            engine.clone(),
            store.clone(),
            config.indices.clone(),
        ));
        let bootstrapper = Arc::new(Bootstrapper::new(
            engine.clone(),
            store.clone(),
            config.indices.clone(),
            config.backfill_batch_size,
        ));

        Self {
            config,
            engine,
            store,
            sync,
            query,
            bootstrapper,
        }
    }
}
