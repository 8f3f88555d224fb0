//! Index bootstrap and operator restore.
//!
//! Creates each owned index when it is missing and backfills it from the
//! read model. Existing indices are left untouched, so running twice is a
//! no-op. Backfill uses the `create` bulk action: a document id that already
//! exists is rejected instead of being silently overwritten, while the rest of
//! the documents are still written.

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::room_store::{RoomReadModel, StoreError};
use super::search_engine::{BulkAction, BulkDocument, SearchEngine, SearchError};
use crate::config::IndexNames;
use crate::models::{MessageDocument, RoomDocument};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("read model error: {0}")]
    Store(#[from] StoreError),
    #[error("search engine error: {0}")]
    Search(#[from] SearchError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub created_indices: Vec<String>,
    pub rooms_backfilled: usize,
    pub messages_backfilled: usize,
}

pub fn rooms_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "name": { "type": "text" }
            }
        }
    })
}

pub fn messages_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "room_id": { "type": "keyword" },
                "sender": { "type": "keyword" },
                "content": { "type": "text" },
                "display_name": { "type": "text" }
            }
        }
    })
}

pub struct Bootstrapper {
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn RoomReadModel>,
    indices: IndexNames,
    batch_size: usize,
}

impl Bootstrapper {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RoomReadModel>,
        indices: IndexNames,
        batch_size: usize,
    ) -> Self {
        Self {
            engine,
            store,
            indices,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        let mut report = BootstrapReport::default();

        if self.ensure_index(&self.indices.rooms, &rooms_mapping()).await? {
            report.created_indices.push(self.indices.rooms.clone());
            let rooms: Vec<RoomDocument> = self
                .store
                .get_all_clear_rooms_names()
                .await?
                .into_iter()
                .map(RoomDocument::from)
                .collect();
            report.rooms_backfilled = self
                .backfill(&self.indices.rooms, rooms, |room| room.id.clone())
                .await?;
        }

        if self
            .ensure_index(&self.indices.messages, &messages_mapping())
            .await?
        {
            report.created_indices.push(self.indices.messages.clone());
            let messages: Vec<MessageDocument> = self
                .store
                .get_all_clear_rooms_messages()
                .await?
                .into_iter()
                .map(MessageDocument::from)
                .collect();
            report.messages_backfilled = self
                .backfill(&self.indices.messages, messages, |message| {
                    message.id.clone()
                })
                .await?;
        }

        info!(
            created = ?report.created_indices,
            rooms = report.rooms_backfilled,
            messages = report.messages_backfilled,
            "Search index bootstrap finished"
        );

        Ok(report)
    }

    /// Returns `true` when the index had to be created.
    async fn ensure_index(&self, name: &str, mapping: &Value) -> Result<bool, BootstrapError> {
        if self.engine.index_exists(name).await? {
            info!(index = %name, "Index exists; skipping backfill");
            return Ok(false);
        }

        self.engine.create_index(name, mapping).await?;
        info!(index = %name, "Index created");
        Ok(true)
    }

    async fn backfill<T, F>(
        &self,
        index: &str,
        documents: Vec<T>,
        id_of: F,
    ) -> Result<usize, BootstrapError>
    where
        T: Serialize,
        F: Fn(&T) -> String,
    {
        let total = documents.len();
        let mut failures = Vec::new();

        // Every batch is sent; per-document failures are reported once at the end.
        for chunk in documents.chunks(self.batch_size) {
            let entries = chunk
                .iter()
                .map(|document| {
                    BulkDocument::from_document(id_of(document), BulkAction::Create, document)
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut batch = BTreeMap::new();
            batch.insert(index.to_string(), entries);
            match self.engine.index_documents(batch).await {
                Ok(()) => {}
                Err(SearchError::BulkFailure {
                    failures: rejected,
                }) => {
                    warn!(
                        index = %index,
                        rejected = rejected.len(),
                        "Backfill batch had rejected documents"
                    );
                    failures.extend(rejected);
                }
                Err(err) => return Err(err.into()),
            }
        }

        if !failures.is_empty() {
            return Err(SearchError::BulkFailure { failures }.into());
        }

        info!(index = %index, documents = total, "Backfill written");
        Ok(total)
    }
}
