pub mod bootstrap;
pub mod elasticsearch;
pub mod index_sync;
pub mod postgres_store;
pub mod query;
pub mod room_store;
pub mod search_engine;

pub use bootstrap::{BootstrapError, BootstrapReport, Bootstrapper};
pub use elasticsearch::{ElasticsearchClient, ElasticsearchSettings};
pub use index_sync::{IndexSyncService, SyncError, SyncOutcome};
pub use postgres_store::PgRoomStore;
pub use query::{QueryError, QueryService, SearchResults};
pub use room_store::{RoomReadModel, StoreError};
pub use search_engine::{SearchEngine, SearchError};
