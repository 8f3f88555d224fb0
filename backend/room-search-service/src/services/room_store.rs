use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ClearRoomMessage, DirectRoomAvatar, MemberDisplayName, RoomDetail, RoomName};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    RoomNotFound(String),
    /// Room ids are unique in the store; more than one row is an integrity
    /// fault that is reported, never repaired here.
    #[error("room {room_id} matched {count} rows")]
    AmbiguousRoom { room_id: String, count: usize },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only view over the authoritative room, membership and event store.
#[async_trait]
pub trait RoomReadModel: Send + Sync {
    async fn get_all_clear_rooms_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Clear rooms that carry a name.
    async fn get_all_clear_rooms_names(&self) -> Result<Vec<RoomName>, StoreError>;

    async fn is_encrypted_room(&self, room_id: &str) -> Result<bool, StoreError> {
        Ok(!self.get_room_detail(room_id).await?.is_clear())
    }

    /// Fails with [`StoreError::RoomNotFound`] or [`StoreError::AmbiguousRoom`].
    async fn get_room_detail(&self, room_id: &str) -> Result<RoomDetail, StoreError>;

    async fn get_rooms_details(&self, room_ids: &[String]) -> Result<Vec<RoomDetail>, StoreError>;

    /// Whether a redaction targeting `event_id` has been persisted.
    async fn is_redacted(&self, event_id: &str) -> Result<bool, StoreError>;

    async fn get_user_display_name(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn get_members_display_names(
        &self,
        room_ids: &[String],
    ) -> Result<Vec<MemberDisplayName>, StoreError>;

    /// Current messages of every clear room, each annotated with its
    /// sender's latest display name in that room.
    async fn get_all_clear_rooms_messages(&self) -> Result<Vec<ClearRoomMessage>, StoreError>;

    /// Rooms the user has any membership record in.
    async fn get_user_rooms_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    async fn get_direct_rooms_ids(&self, room_ids: &[String]) -> Result<Vec<String>, StoreError>;

    /// For each direct room, the avatar of the participant other than `user_id`.
    async fn get_direct_rooms_avatar_url(
        &self,
        room_ids: &[String],
        user_id: &str,
    ) -> Result<Vec<DirectRoomAvatar>, StoreError>;

    async fn get_user_id_by_access_token(&self, token: &str)
        -> Result<Option<String>, StoreError>;

    async fn get_user_email(&self, user_id: &str) -> Result<Option<String>, StoreError>;
}
