use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ROOM_NAME: &str = "m.room.name";
pub const ROOM_ENCRYPTION: &str = "m.room.encryption";
pub const ROOM_MESSAGE: &str = "m.room.message";
pub const ROOM_REDACTION: &str = "m.room.redaction";
pub const ROOM_MEMBER: &str = "m.room.member";

const REL_TYPE_REPLACE: &str = "m.replace";

/// Room timeline or state event as delivered by the event transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub room_id: String,
    pub sender: String,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
}

/// Reason an event of a relevant type could not be turned into an index change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventShapeError {
    #[error("{event_type} event without event_id")]
    MissingEventId { event_type: String },
    #[error("edit event without target event id")]
    MissingEditTarget,
    #[error("edit event without m.new_content.body")]
    MissingEditBody,
    #[error("redaction target {0:?} is not an event id")]
    InvalidRedactionTarget(Option<String>),
}

/// Index-relevant changes carried by room events.
///
/// One variant per kind of change the synchronization service reacts to;
/// everything else is ignored at classification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomIndexEvent {
    RoomNameChanged {
        room_id: String,
        name: Option<String>,
    },
    RoomEncrypted {
        room_id: String,
        algorithm: String,
    },
    MessageSent {
        room_id: String,
        event_id: String,
        sender: String,
        body: String,
    },
    MessageEdited {
        room_id: String,
        target_event_id: String,
        body: String,
    },
    MessageRedacted {
        room_id: String,
        event_id: String,
    },
    DisplayNameChanged {
        room_id: String,
        user_id: String,
        display_name: String,
    },
}

impl RoomIndexEvent {
    /// Classify a raw room event. `Ok(None)` means the event has no effect on
    /// the indices.
    pub fn from_event(event: &RoomEvent) -> Result<Option<Self>, EventShapeError> {
        let room_id = event.room_id.clone();

        match event.event_type.as_str() {
            ROOM_NAME => {
                let name = str_field(&event.content, "name")
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_owned);
                Ok(Some(Self::RoomNameChanged { room_id, name }))
            }
            ROOM_ENCRYPTION => Ok(str_field(&event.content, "algorithm").map(|algorithm| {
                Self::RoomEncrypted {
                    room_id,
                    algorithm: algorithm.to_owned(),
                }
            })),
            ROOM_MESSAGE => classify_message(event, room_id),
            ROOM_REDACTION => {
                let target = event
                    .redacts
                    .as_deref()
                    .or_else(|| str_field(&event.content, "redacts"));

                match target {
                    Some(target) if is_event_id(target) => Ok(Some(Self::MessageRedacted {
                        room_id,
                        event_id: target.to_owned(),
                    })),
                    other => Err(EventShapeError::InvalidRedactionTarget(
                        other.map(str::to_owned),
                    )),
                }
            }
            ROOM_MEMBER => {
                let new_name = str_field(&event.content, "displayname");
                let previous_name = event
                    .unsigned
                    .as_ref()
                    .and_then(|unsigned| unsigned.get("prev_content"))
                    .and_then(|prev| str_field(prev, "displayname"));

                match (new_name, previous_name) {
                    (Some(new_name), Some(previous_name)) if new_name != previous_name => {
                        Ok(Some(Self::DisplayNameChanged {
                            room_id,
                            user_id: event
                                .state_key
                                .clone()
                                .unwrap_or_else(|| event.sender.clone()),
                            display_name: new_name.to_owned(),
                        }))
                    }
                    _ => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomNameChanged { .. } => "room_name_changed",
            Self::RoomEncrypted { .. } => "room_encrypted",
            Self::MessageSent { .. } => "message_sent",
            Self::MessageEdited { .. } => "message_edited",
            Self::MessageRedacted { .. } => "message_redacted",
            Self::DisplayNameChanged { .. } => "display_name_changed",
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            Self::RoomNameChanged { room_id, .. }
            | Self::RoomEncrypted { room_id, .. }
            | Self::MessageSent { room_id, .. }
            | Self::MessageEdited { room_id, .. }
            | Self::MessageRedacted { room_id, .. }
            | Self::DisplayNameChanged { room_id, .. } => room_id,
        }
    }
}

fn classify_message(
    event: &RoomEvent,
    room_id: String,
) -> Result<Option<RoomIndexEvent>, EventShapeError> {
    let content = &event.content;

    if let Some(new_content) = content.get("m.new_content") {
        let relation = content.get("m.relates_to");
        let is_replace = relation
            .and_then(|rel| str_field(rel, "rel_type"))
            .is_some_and(|rel_type| rel_type == REL_TYPE_REPLACE);

        if is_replace {
            let target_event_id = relation
                .and_then(|rel| str_field(rel, "event_id"))
                .filter(|id| !id.is_empty())
                .ok_or(EventShapeError::MissingEditTarget)?;
            let body = str_field(new_content, "body").ok_or(EventShapeError::MissingEditBody)?;

            return Ok(Some(RoomIndexEvent::MessageEdited {
                room_id,
                target_event_id: target_event_id.to_owned(),
                body: body.to_owned(),
            }));
        }
    }

    // Redacted or non-text messages carry no body.
    let Some(body) = str_field(content, "body") else {
        return Ok(None);
    };

    let event_id = event
        .event_id
        .clone()
        .ok_or_else(|| EventShapeError::MissingEventId {
            event_type: event.event_type.clone(),
        })?;

    Ok(Some(RoomIndexEvent::MessageSent {
        room_id,
        event_id,
        sender: event.sender.clone(),
        body: body.to_owned(),
    }))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Event ids are `$` followed by an opaque, whitespace-free local part.
pub fn is_event_id(candidate: &str) -> bool {
    candidate
        .strip_prefix('$')
        .is_some_and(|rest| !rest.is_empty() && !rest.chars().any(|c| c.is_whitespace() || c.is_control()))
}
