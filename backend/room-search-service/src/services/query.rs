use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use super::room_store::{RoomReadModel, StoreError};
use super::search_engine::{IndexFieldSpec, SearchEngine, SearchError, SearchHit};
use crate::config::IndexNames;
use crate::models::{MessageDocument, RoomDetail, RoomDocument};

const ROOM_FIELDS: &[&str] = &["name"];
const MESSAGE_FIELDS: &[&str] = &["display_name", "content"];
const MAIL_FIELDS: &[&str] = &[
    "subject",
    "textBody",
    "from.name",
    "from.address",
    "to.name",
    "to.address",
    "cc.name",
    "cc.address",
    "bcc.name",
    "bcc.address",
    "attachments.fileName",
    "attachments.textContent",
    "userFlags",
];
const MAIL_PARTICIPANT_FIELDS: &[&str] = &["from", "to", "cc", "bcc"];

/// Engine default for `index.max_regex_length`.
pub const MAX_REGEX_LENGTH: usize = 1000;

/// Characters with a meaning in the engine's regular expression syntax.
const REGEX_RESERVED: &[char] = &[
    '.', '?', '+', '*', '|', '{', '}', '[', ']', '(', ')', '"', '\\', '#', '@', '&', '<', '>',
    '~',
];

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid search request: {0}")]
    Validation(String),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoomSearchResult {
    pub id: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MessageSearchResult {
    pub id: String,
    pub room_id: String,
    pub content: String,
    pub sender: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// `None` for direct rooms.
    pub room_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SearchResults {
    pub rooms: Vec<RoomSearchResult>,
    pub messages: Vec<MessageSearchResult>,
    /// Mail documents as stored by the mail indexer, plus their `id`.
    #[schema(value_type = Vec<Object>)]
    pub mails: Vec<Map<String, Value>>,
}

pub struct QueryService {
    engine: Arc<dyn SearchEngine>,
    store: Arc<dyn RoomReadModel>,
    indices: IndexNames,
}

impl QueryService {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        store: Arc<dyn RoomReadModel>,
        indices: IndexNames,
    ) -> Self {
        Self {
            engine,
            store,
            indices,
        }
    }

    pub async fn search(
        &self,
        search_value: &str,
        user_id: &str,
        user_email: Option<&str>,
    ) -> Result<SearchResults, QueryError> {
        if search_value.trim().is_empty() {
            return Err(QueryError::Validation(
                "searchValue must not be empty".to_string(),
            ));
        }

        let specs = [
            IndexFieldSpec::new(&self.indices.rooms, ROOM_FIELDS),
            IndexFieldSpec::new(&self.indices.messages, MESSAGE_FIELDS),
            IndexFieldSpec::new(&self.indices.mails, MAIL_FIELDS),
        ];
        let regex = search_regex(search_value)?;

        let mut hits = self
            .engine
            .search_on_multiple_indexes(&regex, &specs)
            .await?
            .into_iter();
        let room_hits = hits.next().unwrap_or_default();
        let message_hits = hits.next().unwrap_or_default();
        let mail_hits = hits.next().unwrap_or_default();

        let user_rooms: HashSet<String> = self
            .store
            .get_user_rooms_ids(user_id)
            .await?
            .into_iter()
            .collect();

        let rooms = room_hits
            .into_iter()
            .map(decode_room)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|room| user_rooms.contains(&room.id))
            .collect::<Vec<_>>();

        let messages = message_hits
            .into_iter()
            .map(decode_message)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|message| user_rooms.contains(&message.room_id))
            .collect::<Vec<_>>();

        let mails = mail_hits
            .into_iter()
            .filter(|hit| user_email.is_some_and(|email| mail_involves(&hit.source, email)))
            .map(|hit| {
                let mut source = hit.source;
                source.insert("id".to_string(), Value::String(hit.id));
                source
            })
            .collect();

        if rooms.is_empty() && messages.is_empty() {
            return Ok(SearchResults {
                mails,
                ..SearchResults::default()
            });
        }

        let user_room_ids: Vec<String> = user_rooms.into_iter().collect();
        let details: HashMap<String, RoomDetail> = self
            .store
            .get_rooms_details(&user_room_ids)
            .await?
            .into_iter()
            .map(|detail| (detail.room_id.clone(), detail))
            .collect();

        let message_room_ids: Vec<String> = messages
            .iter()
            .map(|message| message.room_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let (direct_rooms, direct_avatars) = if message_room_ids.is_empty() {
            (HashSet::new(), HashMap::new())
        } else {
            let direct_rooms: Vec<String> =
                self.store.get_direct_rooms_ids(&message_room_ids).await?;
            let direct_avatars: HashMap<String, Option<String>> = if direct_rooms.is_empty() {
                HashMap::new()
            } else {
                self.store
                    .get_direct_rooms_avatar_url(&direct_rooms, user_id)
                    .await?
                    .into_iter()
                    .map(|avatar| (avatar.room_id, avatar.avatar_url))
                    .collect()
            };
            (direct_rooms.into_iter().collect::<HashSet<_>>(), direct_avatars)
        };

        let rooms = rooms
            .into_iter()
            .map(|room| RoomSearchResult {
                avatar_url: details.get(&room.id).and_then(|d| d.avatar.clone()),
                id: room.id,
                name: room.name,
            })
            .collect();

        let messages = messages
            .into_iter()
            .map(|message| {
                let detail = details.get(&message.room_id);
                let (avatar_url, room_name) = if direct_rooms.contains(&message.room_id) {
                    (direct_avatars.get(&message.room_id).cloned().flatten(), None)
                } else {
                    (
                        detail.and_then(|d| d.avatar.clone()),
                        detail.and_then(|d| d.name.clone()),
                    )
                };
                MessageSearchResult {
                    id: message.id,
                    room_id: message.room_id,
                    content: message.content,
                    sender: message.sender,
                    display_name: message.display_name,
                    avatar_url,
                    room_name,
                }
            })
            .collect();

        Ok(SearchResults {
            rooms,
            messages,
            mails,
        })
    }
}

/// Regular expression matching any value that contains `search_value`
/// literally.
pub fn contains_regex(search_value: &str) -> String {
    let mut escaped = String::with_capacity(search_value.len() + 4);
    escaped.push_str(".*");
    for c in search_value.chars() {
        if REGEX_RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push_str(".*");
    escaped
}

/// [`contains_regex`] bounded by the engine's regular expression length.
fn search_regex(search_value: &str) -> Result<String, QueryError> {
    let regex = contains_regex(search_value);
    if regex.chars().count() > MAX_REGEX_LENGTH {
        return Err(QueryError::Validation(format!(
            "searchValue is too long (limit {MAX_REGEX_LENGTH} characters once escaped)"
        )));
    }
    Ok(regex)
}

/// Whether `email` is one of the mail's `from`/`to`/`cc`/`bcc` addresses.
pub fn mail_involves(source: &Map<String, Value>, email: &str) -> bool {
    MAIL_PARTICIPANT_FIELDS.iter().any(|field| {
        let participants = match source.get(*field) {
            Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
            Some(single @ Value::Object(_)) => vec![single],
            _ => return false,
        };
        participants.into_iter().any(|participant| {
            participant
                .get("address")
                .and_then(Value::as_str)
                .is_some_and(|address| address.eq_ignore_ascii_case(email))
        })
    })
}

fn decode_room(hit: SearchHit) -> Result<RoomDocument, SearchError> {
    let mut room: RoomDocument = serde_json::from_value(Value::Object(hit.source))?;
    room.id = hit.id;
    Ok(room)
}

fn decode_message(hit: SearchHit) -> Result<MessageDocument, SearchError> {
    let mut message: MessageDocument = serde_json::from_value(Value::Object(hit.source))?;
    message.id = hit.id;
    Ok(message)
}
