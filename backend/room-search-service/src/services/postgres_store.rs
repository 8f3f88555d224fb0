use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use super::room_store::{RoomReadModel, StoreError};
use crate::models::events::{RoomEvent, RoomIndexEvent, ROOM_MESSAGE};
use crate::models::{ClearRoomMessage, DirectRoomAvatar, MemberDisplayName, RoomDetail, RoomName};

const ROOM_DETAIL_COLUMNS: &str = r#"
    room_id, name, encryption, avatar, topic, join_rules,
    history_visibility, guest_access, is_federatable, room_type
"#;

/// [`RoomReadModel`] over the homeserver's Postgres database.
#[derive(Clone)]
pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[derive(Debug, FromRow)]
struct StoredMessageRow {
    event_id: String,
    room_id: String,
    json: String,
}

#[derive(Debug, Deserialize)]
struct StoredEventJson {
    sender: String,
    #[serde(default)]
    content: Value,
}

#[async_trait]
impl RoomReadModel for PgRoomStore {
    async fn get_all_clear_rooms_ids(&self) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT room_id FROM room_stats_state WHERE encryption IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_all_clear_rooms_names(&self) -> Result<Vec<RoomName>, StoreError> {
        let rooms = sqlx::query_as::<_, RoomName>(
            r#"
            SELECT room_id, name
            FROM room_stats_state
            WHERE encryption IS NULL
              AND name IS NOT NULL
              AND name <> ''
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rooms)
    }

    async fn get_room_detail(&self, room_id: &str) -> Result<RoomDetail, StoreError> {
        let mut rows = sqlx::query_as::<_, RoomDetail>(&format!(
            "SELECT {ROOM_DETAIL_COLUMNS} FROM room_stats_state WHERE room_id = $1"
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        match rows.len() {
            0 => Err(StoreError::RoomNotFound(room_id.to_string())),
            1 => Ok(rows.remove(0)),
            count => Err(StoreError::AmbiguousRoom {
                room_id: room_id.to_string(),
                count,
            }),
        }
    }

    async fn get_rooms_details(&self, room_ids: &[String]) -> Result<Vec<RoomDetail>, StoreError> {
        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        let rooms = sqlx::query_as::<_, RoomDetail>(&format!(
            "SELECT {ROOM_DETAIL_COLUMNS} FROM room_stats_state WHERE room_id = ANY($1)"
        ))
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rooms)
    }

    async fn get_user_display_name(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let display_name = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT rm.display_name
            FROM room_memberships rm
            JOIN events e ON e.event_id = rm.event_id
            WHERE rm.room_id = $1 AND rm.user_id = $2
            ORDER BY e.stream_ordering DESC
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(display_name.flatten())
    }

    async fn is_redacted(&self, event_id: &str) -> Result<bool, StoreError> {
        let redacted = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM redactions WHERE redacts = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(redacted)
    }

    async fn get_members_display_names(
        &self,
        room_ids: &[String],
    ) -> Result<Vec<MemberDisplayName>, StoreError> {
        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        let members = sqlx::query_as::<_, MemberDisplayName>(
            r#"
            SELECT DISTINCT ON (rm.room_id, rm.user_id)
                rm.room_id, rm.user_id, rm.display_name
            FROM room_memberships rm
            JOIN events e ON e.event_id = rm.event_id
            WHERE rm.room_id = ANY($1)
            ORDER BY rm.room_id, rm.user_id, e.stream_ordering DESC
            "#,
        )
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn get_all_clear_rooms_messages(&self) -> Result<Vec<ClearRoomMessage>, StoreError> {
        let rows = sqlx::query_as::<_, StoredMessageRow>(
            r#"
            SELECT ej.event_id, ej.room_id, ej.json
            FROM event_json ej
            JOIN events e ON e.event_id = ej.event_id
            JOIN room_stats_state rss ON rss.room_id = ej.room_id
            WHERE e.type = 'm.room.message'
              AND rss.encryption IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM redactions r WHERE r.redacts = ej.event_id
              )
            ORDER BY e.stream_ordering ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let events: Vec<RoomIndexEvent> = rows.into_iter().filter_map(classify_stored).collect();

        let room_ids: Vec<String> = events
            .iter()
            .map(|event| event.room_id().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let names = self.get_members_display_names(&room_ids).await?;

        Ok(fold_current_messages(events, &names))
    }

    async fn get_user_rooms_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT room_id FROM room_memberships WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_direct_rooms_ids(&self, room_ids: &[String]) -> Result<Vec<String>, StoreError> {
        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT direct.room_id
            FROM account_data ad
            CROSS JOIN LATERAL jsonb_each(ad.content::jsonb) AS peers(user_id, rooms)
            CROSS JOIN LATERAL jsonb_array_elements_text(
                CASE WHEN jsonb_typeof(peers.rooms) = 'array' THEN peers.rooms ELSE '[]'::jsonb END
            ) AS direct(room_id)
            WHERE ad.account_data_type = 'm.direct'
              AND direct.room_id = ANY($1)
            "#,
        )
        .bind(room_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_direct_rooms_avatar_url(
        &self,
        room_ids: &[String],
        user_id: &str,
    ) -> Result<Vec<DirectRoomAvatar>, StoreError> {
        if room_ids.is_empty() {
            return Ok(vec![]);
        }

        let avatars = sqlx::query_as::<_, DirectRoomAvatar>(
            r#"
            SELECT DISTINCT ON (rm.room_id) rm.room_id, rm.avatar_url
            FROM room_memberships rm
            JOIN events e ON e.event_id = rm.event_id
            WHERE rm.room_id = ANY($1) AND rm.user_id <> $2
            ORDER BY rm.room_id, e.stream_ordering DESC
            "#,
        )
        .bind(room_ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(avatars)
    }

    async fn get_user_id_by_access_token(
        &self,
        token: &str,
    ) -> Result<Option<String>, StoreError> {
        let user_id = sqlx::query_scalar::<_, String>(
            r#"
            SELECT user_id
            FROM access_tokens
            WHERE token = $1
              AND (valid_until_ms IS NULL OR valid_until_ms > $2)
            "#,
        )
        .bind(token)
        .bind(chrono::Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }

    async fn get_user_email(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let email = sqlx::query_scalar::<_, String>(
            r#"
            SELECT address
            FROM user_threepids
            WHERE user_id = $1 AND medium = 'email'
            ORDER BY added_at ASC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(email)
    }
}

fn classify_stored(row: StoredMessageRow) -> Option<RoomIndexEvent> {
    let stored: StoredEventJson = match serde_json::from_str(&row.json) {
        Ok(stored) => stored,
        Err(err) => {
            warn!(event_id = %row.event_id, "Skipping unreadable stored event: {err}");
            return None;
        }
    };

    let event = RoomEvent {
        event_type: ROOM_MESSAGE.to_string(),
        room_id: row.room_id,
        sender: stored.sender,
        content: stored.content,
        event_id: Some(row.event_id),
        state_key: None,
        redacts: None,
        unsigned: None,
    };

    match RoomIndexEvent::from_event(&event) {
        Ok(classified) => classified,
        Err(err) => {
            warn!(event_id = ?event.event_id, "Skipping stored message: {err}");
            None
        }
    }
}

/// Reduce a room's message history (oldest first) to its current state:
/// edits rewrite their target's content and are not documents of their own.
pub(crate) fn fold_current_messages(
    events: Vec<RoomIndexEvent>,
    names: &[MemberDisplayName],
) -> Vec<ClearRoomMessage> {
    let display_names: HashMap<(&str, &str), &str> = names
        .iter()
        .filter_map(|member| {
            member
                .display_name
                .as_deref()
                .map(|name| ((member.room_id.as_str(), member.user_id.as_str()), name))
        })
        .collect();

    let mut messages: Vec<ClearRoomMessage> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for event in events {
        match event {
            RoomIndexEvent::MessageSent {
                room_id,
                event_id,
                sender,
                body,
            } => {
                let display_name = display_names
                    .get(&(room_id.as_str(), sender.as_str()))
                    .map(|name| name.to_string());
                positions.insert(event_id.clone(), messages.len());
                messages.push(ClearRoomMessage {
                    event_id,
                    room_id,
                    content: body,
                    sender,
                    display_name,
                });
            }
            RoomIndexEvent::MessageEdited {
                target_event_id,
                body,
                ..
            } => {
                if let Some(&position) = positions.get(&target_event_id) {
                    messages[position].content = body;
                }
            }
            _ => {}
        }
    }

    messages
}
