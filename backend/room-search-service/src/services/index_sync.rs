//! Keeps the rooms and messages indices consistent with room events.
//!
//! Every handler re-reads room state from the read model instead of caching
//! it. Failures are logged and swallowed in [`IndexSyncService::handle_event`]
//! so a bad event never blocks the transport; drift is repaired by an
//! operator-triggered restore.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::room_store::{RoomReadModel, StoreError};
use super::search_engine::{
    BulkAction, BulkDocument, DocumentQuery, SearchEngine, SearchError, UpdateScript,
};
use crate::config::{DisplayNameScope, IndexNames};
use crate::models::{MessageDocument, RoomDocument, RoomEvent, RoomIndexEvent};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("read model error: {0}")]
    Store(#[from] StoreError),
    #[error("search engine error: {0}")]
    Search(#[from] SearchError),
}

impl SyncError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Search(err) => err.status(),
            SyncError::Store(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    SkippedEncryptedRoom,
    SkippedRedactedMessage,
}

pub struct IndexSyncService {
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn RoomReadModel>,
    indices: IndexNames,
    display_name_scope: DisplayNameScope,
}

impl IndexSyncService {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RoomReadModel>,
        indices: IndexNames,
        display_name_scope: DisplayNameScope,
    ) -> Self {
        Self {
            engine,
            store,
            indices,
            display_name_scope,
        }
    }

    /// Entry point for the event transport. Never fails.
    pub async fn handle_event(&self, event: &RoomEvent) {
        let classified = match RoomIndexEvent::from_event(event) {
            Ok(Some(classified)) => classified,
            Ok(None) => {
                debug!(
                    event_type = %event.event_type,
                    room_id = %event.room_id,
                    "Room event has no effect on search indices"
                );
                return;
            }
            Err(err) => {
                warn!(
                    event_type = %event.event_type,
                    room_id = %event.room_id,
                    event_id = ?event.event_id,
                    "Ignoring malformed room event: {err}"
                );
                return;
            }
        };

        match self.apply(&classified).await {
            Ok(SyncOutcome::Applied) => debug!(
                event_type = %event.event_type,
                kind = classified.kind(),
                room_id = %event.room_id,
                event_id = ?event.event_id,
                "Search indices synchronized"
            ),
            Ok(SyncOutcome::SkippedEncryptedRoom) => debug!(
                event_type = %event.event_type,
                room_id = %event.room_id,
                event_id = ?event.event_id,
                "Room is encrypted; event not indexed"
            ),
            Ok(SyncOutcome::SkippedRedactedMessage) => debug!(
                room_id = %event.room_id,
                event_id = ?event.event_id,
                "Message already redacted; event not indexed"
            ),
            Err(err) => error!(
                event_type = %event.event_type,
                kind = classified.kind(),
                room_id = %event.room_id,
                event_id = ?event.event_id,
                status = ?err.status(),
                "Failed to synchronize search indices: {err}"
            ),
        }
    }

    pub async fn apply(&self, event: &RoomIndexEvent) -> Result<SyncOutcome, SyncError> {
        match event {
            RoomIndexEvent::RoomNameChanged { room_id, name } => {
                self.on_room_name_changed(room_id, name.as_deref()).await
            }
            RoomIndexEvent::RoomEncrypted { room_id, algorithm } => {
                self.on_room_encrypted(room_id, algorithm).await
            }
            RoomIndexEvent::MessageSent {
                room_id,
                event_id,
                sender,
                body,
            } => self.on_message_sent(room_id, event_id, sender, body).await,
            RoomIndexEvent::MessageEdited {
                target_event_id,
                body,
                ..
            } => {
                let mut fields = Map::new();
                fields.insert("content".to_string(), Value::String(body.clone()));
                self.engine
                    .update_document(&self.indices.messages, target_event_id, fields)
                    .await?;
                Ok(SyncOutcome::Applied)
            }
            RoomIndexEvent::MessageRedacted { event_id, .. } => {
                self.engine
                    .delete_document(&self.indices.messages, event_id)
                    .await?;
                Ok(SyncOutcome::Applied)
            }
            RoomIndexEvent::DisplayNameChanged {
                room_id,
                user_id,
                display_name,
            } => {
                self.on_display_name_changed(room_id, user_id, display_name)
                    .await
            }
        }
    }

    async fn on_room_name_changed(
        &self,
        room_id: &str,
        name: Option<&str>,
    ) -> Result<SyncOutcome, SyncError> {
        if self.store.is_encrypted_room(room_id).await? {
            return Ok(SyncOutcome::SkippedEncryptedRoom);
        }

        match name {
            Some(name) => {
                let document = RoomDocument {
                    id: room_id.to_string(),
                    name: name.to_string(),
                };
                let mut batch = BTreeMap::new();
                batch.insert(
                    self.indices.rooms.clone(),
                    vec![BulkDocument::from_document(
                        room_id,
                        BulkAction::Index,
                        &document,
                    )?],
                );
                self.engine.index_documents(batch).await?;
            }
            None => {
                self.engine
                    .delete_document(&self.indices.rooms, room_id)
                    .await?;
            }
        }

        Ok(SyncOutcome::Applied)
    }

    async fn on_room_encrypted(
        &self,
        room_id: &str,
        algorithm: &str,
    ) -> Result<SyncOutcome, SyncError> {
        self.engine
            .delete_document(&self.indices.rooms, room_id)
            .await?;

        let outcome = self
            .engine
            .delete_documents(
                &self.indices.messages,
                &DocumentQuery::field("room_id", room_id),
            )
            .await?;

        info!(
            room_id = %room_id,
            algorithm = %algorithm,
            deleted = outcome.applied,
            version_conflicts = outcome.version_conflicts,
            "Room encrypted; removed its documents from search indices"
        );

        if outcome.failures > 0 {
            warn!(
                room_id = %room_id,
                failures = outcome.failures,
                "Some message documents of an encrypted room could not be deleted"
            );
        }

        Ok(SyncOutcome::Applied)
    }

    async fn on_message_sent(
        &self,
        room_id: &str,
        event_id: &str,
        sender: &str,
        body: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let display_name = self.store.get_user_display_name(room_id, sender).await?;
        let room_indexed = self
            .engine
            .document_exists(&self.indices.rooms, room_id)
            .await?;

        // A redaction may be delivered before the message it targets, and a
        // replayed message must not resurrect a redacted one.
        if self.store.is_redacted(event_id).await? {
            return Ok(SyncOutcome::SkippedRedactedMessage);
        }

        // Encryption state is read last to keep the window against a
        // concurrent encryption event as small as possible.
        let room = self.store.get_room_detail(room_id).await?;
        if !room.is_clear() {
            return Ok(SyncOutcome::SkippedEncryptedRoom);
        }

        let message = MessageDocument {
            id: event_id.to_string(),
            room_id: room_id.to_string(),
            content: body.to_string(),
            sender: sender.to_string(),
            display_name,
        };

        let mut batch = BTreeMap::new();
        batch.insert(
            self.indices.messages.clone(),
            vec![BulkDocument::from_document(
                event_id,
                BulkAction::Index,
                &message,
            )?],
        );

        if let Some(name) = room.name.filter(|name| !name.trim().is_empty()) {
            if !room_indexed {
                let document = RoomDocument {
                    id: room_id.to_string(),
                    name,
                };
                batch.insert(
                    self.indices.rooms.clone(),
                    vec![BulkDocument::from_document(
                        room_id,
                        BulkAction::Index,
                        &document,
                    )?],
                );
            }
        }

        self.engine.index_documents(batch).await?;
        Ok(SyncOutcome::Applied)
    }

    async fn on_display_name_changed(
        &self,
        room_id: &str,
        user_id: &str,
        display_name: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let query = match self.display_name_scope {
            DisplayNameScope::Global => DocumentQuery::field("sender", user_id),
            DisplayNameScope::Room => {
                DocumentQuery::field("sender", user_id).and("room_id", room_id)
            }
        };
        let script = UpdateScript::SetField {
            field: "display_name".to_string(),
            value: json!(display_name),
        };

        let outcome = self
            .engine
            .update_documents(&self.indices.messages, &script, &query)
            .await?;

        if outcome.version_conflicts > 0 || outcome.failures > 0 {
            warn!(
                user_id = %user_id,
                room_id = %room_id,
                updated = outcome.applied,
                version_conflicts = outcome.version_conflicts,
                failures = outcome.failures,
                "Display name propagation skipped some documents"
            );
        }

        Ok(SyncOutcome::Applied)
    }
}
