pub mod events;

pub use events::{RoomEvent, RoomIndexEvent};

use serde::{Deserialize, Serialize};

/// Document stored in the rooms index. Only clear, named rooms have one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDocument {
    #[serde(default)]
    pub id: String,
    pub name: String,
}

/// Document stored in the messages index.
///
/// `display_name` is the sender's room display name when the document was
/// last written, not a live join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDocument {
    #[serde(default)]
    pub id: String,
    pub room_id: String,
    pub content: String,
    pub sender: String,
    pub display_name: Option<String>,
}

/// Room projection rebuilt from the authoritative store for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomDetail {
    pub room_id: String,
    pub name: Option<String>,
    pub encryption: Option<String>,
    pub avatar: Option<String>,
    pub topic: Option<String>,
    pub join_rules: Option<String>,
    pub history_visibility: Option<String>,
    pub guest_access: Option<String>,
    pub is_federatable: Option<bool>,
    pub room_type: Option<String>,
}

impl RoomDetail {
    pub fn is_clear(&self) -> bool {
        self.encryption.is_none()
    }
}

/// A clear room that carries a name.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RoomName {
    pub room_id: String,
    pub name: String,
}

impl From<RoomName> for RoomDocument {
    fn from(room: RoomName) -> Self {
        Self {
            id: room.room_id,
            name: room.name,
        }
    }
}

/// Latest known display name of a member in a room.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MemberDisplayName {
    pub room_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
}

/// A message of a clear room, annotated with the sender's current display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearRoomMessage {
    pub event_id: String,
    pub room_id: String,
    pub content: String,
    pub sender: String,
    pub display_name: Option<String>,
}

impl From<ClearRoomMessage> for MessageDocument {
    fn from(message: ClearRoomMessage) -> Self {
        Self {
            id: message.event_id,
            room_id: message.room_id,
            content: message.content,
            sender: message.sender,
            display_name: message.display_name,
        }
    }
}

/// Avatar of the other participant of a direct room.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DirectRoomAvatar {
    pub room_id: String,
    pub avatar_url: Option<String>,
}
