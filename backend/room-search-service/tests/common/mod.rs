#![allow(dead_code)]

use async_trait::async_trait;
use room_search_service::config::Config;
use room_search_service::models::{
    ClearRoomMessage, DirectRoomAvatar, MemberDisplayName, RoomDetail, RoomEvent, RoomName,
};
use room_search_service::services::room_store::{RoomReadModel, StoreError};
use room_search_service::services::search_engine::{
    BulkAction, BulkBatch, BulkItemFailure, ByQueryOutcome, DocumentQuery, IndexFieldSpec,
    SearchEngine, SearchError, SearchHit, UpdateScript,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const ROOMS: &str = "rooms";
pub const MESSAGES: &str = "messages";
pub const MAILS: &str = "mails";

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        (
            "DATABASE_URL".to_string(),
            "postgres://synapse@localhost/synapse".to_string(),
        ),
        (
            "SEARCH_ENGINE_URL".to_string(),
            "http://localhost:9200".to_string(),
        ),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}

type Index = BTreeMap<String, Map<String, Value>>;

/// Search engine keeping documents in memory. Regex searches support the
/// `.*<literal>.*` shape produced by the query service.
#[derive(Default)]
pub struct InMemorySearchEngine {
    indices: Mutex<BTreeMap<String, Index>>,
    failing: AtomicBool,
    bulk_calls: AtomicUsize,
    preseeded: Mutex<Vec<(String, String, Map<String, Value>)>>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indices(names: &[&str]) -> Self {
        let engine = Self::default();
        {
            let mut indices = engine.indices.lock().unwrap();
            for name in names {
                indices.insert(name.to_string(), Index::new());
            }
        }
        engine
    }

    /// Every following call fails with a 500 from the engine.
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    pub fn seed(&self, index: &str, id: &str, source: Value) {
        let source = source.as_object().cloned().unwrap_or_default();
        self.indices
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }

    /// Documents that appear in `index` as soon as it gets created.
    pub fn preseed_on_create(&self, index: &str, id: &str, source: Value) {
        self.preseeded.lock().unwrap().push((
            index.to_string(),
            id.to_string(),
            source.as_object().cloned().unwrap_or_default(),
        ));
    }

    pub fn get(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn ids(&self, index: &str) -> Vec<String> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count_where(&self, index: &str, field: &str, value: &str) -> usize {
        let query = DocumentQuery::field(field, value);
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.values().filter(|doc| query.is_match(doc)).count())
            .unwrap_or(0)
    }

    fn check(&self) -> Result<(), SearchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SearchError::Engine {
                status: 500,
                body: "{\"error\":\"injected\"}".to_string(),
            });
        }
        Ok(())
    }
}

fn literal_of(regex_value: &str) -> String {
    let inner = regex_value
        .strip_prefix(".*")
        .and_then(|v| v.strip_suffix(".*"))
        .unwrap_or(regex_value);
    let mut literal = String::new();
    let mut escaped = false;
    for c in inner.chars() {
        if c == '\\' && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        literal.push(c);
    }
    literal.to_lowercase()
}

fn strings_at<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a str>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| strings_at(item, path, out)),
        Value::String(s) if path.is_empty() => out.push(s),
        Value::Object(map) if !path.is_empty() => {
            if let Some(next) = map.get(path[0]) {
                strings_at(next, &path[1..], out);
            }
        }
        _ => {}
    }
}

#[async_trait]
impl SearchEngine for InMemorySearchEngine {
    async fn create_index(&self, name: &str, _mapping: &Value) -> Result<(), SearchError> {
        self.check()?;
        let mut indices = self.indices.lock().unwrap();
        if indices.contains_key(name) {
            return Err(SearchError::Engine {
                status: 400,
                body: "resource_already_exists_exception".to_string(),
            });
        }
        let docs = self
            .preseeded
            .lock()
            .unwrap()
            .iter()
            .filter(|(index, _, _)| index == name)
            .map(|(_, id, source)| (id.clone(), source.clone()))
            .collect();
        indices.insert(name.to_string(), docs);
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, SearchError> {
        self.check()?;
        Ok(self.indices.lock().unwrap().contains_key(name))
    }

    async fn index_documents(&self, batch: BulkBatch) -> Result<(), SearchError> {
        self.check()?;
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = Vec::new();
        let mut indices = self.indices.lock().unwrap();

        for (index, documents) in batch {
            let docs = indices.entry(index.clone()).or_default();
            for document in documents {
                if document.action == BulkAction::Create && docs.contains_key(&document.id) {
                    failures.push(BulkItemFailure {
                        index: index.clone(),
                        id: document.id,
                        status: 409,
                        reason: "version_conflict_engine_exception".to_string(),
                    });
                    continue;
                }
                docs.insert(document.id, document.fields);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SearchError::BulkFailure { failures })
        }
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), SearchError> {
        self.check()?;
        let mut indices = self.indices.lock().unwrap();
        let doc = indices
            .get_mut(index)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| SearchError::Engine {
                status: 404,
                body: "document_missing_exception".to_string(),
            })?;
        doc.extend(fields);
        Ok(())
    }

    async fn update_documents(
        &self,
        index: &str,
        script: &UpdateScript,
        query: &DocumentQuery,
    ) -> Result<ByQueryOutcome, SearchError> {
        self.check()?;
        let UpdateScript::SetField { field, value } = script;
        let mut outcome = ByQueryOutcome::default();
        let mut indices = self.indices.lock().unwrap();

        if let Some(docs) = indices.get_mut(index) {
            for doc in docs.values_mut().filter(|doc| query.is_match(doc)) {
                doc.insert(field.clone(), value.clone());
                outcome.matched += 1;
                outcome.applied += 1;
            }
        }
        Ok(outcome)
    }

    async fn document_exists(&self, index: &str, id: &str) -> Result<bool, SearchError> {
        self.check()?;
        Ok(self.get(index, id).is_some())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        self.check()?;
        if let Some(docs) = self.indices.lock().unwrap().get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn delete_documents(
        &self,
        index: &str,
        query: &DocumentQuery,
    ) -> Result<ByQueryOutcome, SearchError> {
        self.check()?;
        let mut outcome = ByQueryOutcome::default();
        if let Some(docs) = self.indices.lock().unwrap().get_mut(index) {
            let before = docs.len();
            docs.retain(|_, doc| !query.is_match(doc));
            let removed = (before - docs.len()) as u64;
            outcome.matched = removed;
            outcome.applied = removed;
        }
        Ok(outcome)
    }

    async fn search_on_multiple_indexes(
        &self,
        regex_value: &str,
        specs: &[IndexFieldSpec],
    ) -> Result<Vec<Vec<SearchHit>>, SearchError> {
        self.check()?;
        let needle = literal_of(regex_value);
        let indices = self.indices.lock().unwrap();

        Ok(specs
            .iter()
            .map(|spec| {
                let Some(docs) = indices.get(&spec.index) else {
                    return Vec::new();
                };
                docs.iter()
                    .filter(|(_, source)| {
                        let source = Value::Object((*source).clone());
                        spec.fields.iter().any(|field| {
                            let path: Vec<&str> = field.split('.').collect();
                            let mut found = Vec::new();
                            strings_at(&source, &path, &mut found);
                            found.iter().any(|s| s.to_lowercase().contains(&needle))
                        })
                    })
                    .map(|(id, source)| SearchHit {
                        index: spec.index.clone(),
                        id: id.clone(),
                        score: Some(1.0),
                        source: source.clone(),
                    })
                    .collect()
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), SearchError> {
        self.check()
    }
}

#[derive(Debug, Clone)]
struct Membership {
    room_id: String,
    user_id: String,
    membership: String,
    display_name: Option<String>,
}

#[derive(Default)]
struct StoreData {
    rooms: BTreeMap<String, RoomDetail>,
    memberships: Vec<Membership>,
    messages: Vec<ClearRoomMessage>,
    direct_rooms: HashMap<String, (String, String)>,
    avatars: HashMap<String, String>,
    tokens: HashMap<String, String>,
    emails: HashMap<String, String>,
    redactions: HashSet<String>,
    duplicated_rooms: HashMap<String, usize>,
}

/// Room read model backed by in-memory tables.
#[derive(Default)]
pub struct InMemoryRoomStore {
    data: Mutex<StoreData>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_room(&self, room_id: &str, name: Option<&str>) {
        self.data.lock().unwrap().rooms.insert(
            room_id.to_string(),
            RoomDetail {
                room_id: room_id.to_string(),
                name: name.map(str::to_string),
                encryption: None,
                avatar: None,
                topic: None,
                join_rules: Some("invite".to_string()),
                history_visibility: Some("shared".to_string()),
                guest_access: None,
                is_federatable: Some(true),
                room_type: None,
            },
        );
    }

    pub fn set_room_avatar(&self, room_id: &str, avatar: &str) {
        if let Some(room) = self.data.lock().unwrap().rooms.get_mut(room_id) {
            room.avatar = Some(avatar.to_string());
        }
    }

    pub fn rename_room(&self, room_id: &str, name: Option<&str>) {
        if let Some(room) = self.data.lock().unwrap().rooms.get_mut(room_id) {
            room.name = name.map(str::to_string);
        }
    }

    pub fn encrypt_room(&self, room_id: &str) {
        if let Some(room) = self.data.lock().unwrap().rooms.get_mut(room_id) {
            room.encryption = Some("m.megolm.v1.aes-sha2".to_string());
        }
    }

    pub fn set_membership(
        &self,
        room_id: &str,
        user_id: &str,
        membership: &str,
        display_name: Option<&str>,
    ) {
        self.data.lock().unwrap().memberships.push(Membership {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            membership: membership.to_string(),
            display_name: display_name.map(str::to_string),
        });
    }

    pub fn join(&self, room_id: &str, user_id: &str, display_name: &str) {
        self.set_membership(room_id, user_id, "join", Some(display_name));
    }

    pub fn add_message(&self, room_id: &str, event_id: &str, sender: &str, body: &str) {
        self.data.lock().unwrap().messages.push(ClearRoomMessage {
            event_id: event_id.to_string(),
            room_id: room_id.to_string(),
            content: body.to_string(),
            sender: sender.to_string(),
            display_name: None,
        });
    }

    /// Record a persisted redaction of `event_id`.
    pub fn redact(&self, event_id: &str) {
        self.data
            .lock()
            .unwrap()
            .redactions
            .insert(event_id.to_string());
    }

    /// Make the room lookup return `count` rows for `room_id`.
    pub fn duplicate_room(&self, room_id: &str, count: usize) {
        self.data
            .lock()
            .unwrap()
            .duplicated_rooms
            .insert(room_id.to_string(), count);
    }

    pub fn add_direct_room(&self, room_id: &str, user_a: &str, user_b: &str) {
        self.data
            .lock()
            .unwrap()
            .direct_rooms
            .insert(room_id.to_string(), (user_a.to_string(), user_b.to_string()));
    }

    pub fn set_user_avatar(&self, user_id: &str, avatar_url: &str) {
        self.data
            .lock()
            .unwrap()
            .avatars
            .insert(user_id.to_string(), avatar_url.to_string());
    }

    pub fn add_account(&self, token: &str, user_id: &str, email: Option<&str>) {
        let mut data = self.data.lock().unwrap();
        data.tokens.insert(token.to_string(), user_id.to_string());
        if let Some(email) = email {
            data.emails.insert(user_id.to_string(), email.to_string());
        }
    }

    fn latest_membership(data: &StoreData, room_id: &str, user_id: &str) -> Option<Membership> {
        data.memberships
            .iter()
            .rev()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
            .cloned()
    }
}

#[async_trait]
impl RoomReadModel for InMemoryRoomStore {
    async fn get_all_clear_rooms_ids(&self) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .rooms
            .values()
            .filter(|room| room.is_clear())
            .map(|room| room.room_id.clone())
            .collect())
    }

    async fn get_all_clear_rooms_names(&self) -> Result<Vec<RoomName>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .rooms
            .values()
            .filter(|room| room.is_clear())
            .filter_map(|room| {
                room.name.clone().map(|name| RoomName {
                    room_id: room.room_id.clone(),
                    name,
                })
            })
            .collect())
    }

    async fn get_room_detail(&self, room_id: &str) -> Result<RoomDetail, StoreError> {
        let data = self.data.lock().unwrap();
        if let Some(&count) = data.duplicated_rooms.get(room_id) {
            return Err(StoreError::AmbiguousRoom {
                room_id: room_id.to_string(),
                count,
            });
        }
        data.rooms
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))
    }

    async fn is_redacted(&self, event_id: &str) -> Result<bool, StoreError> {
        Ok(self.data.lock().unwrap().redactions.contains(event_id))
    }

    async fn get_rooms_details(&self, room_ids: &[String]) -> Result<Vec<RoomDetail>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(room_ids
            .iter()
            .filter_map(|id| data.rooms.get(id).cloned())
            .collect())
    }

    async fn get_user_display_name(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(Self::latest_membership(&data, room_id, user_id).and_then(|m| m.display_name))
    }

    async fn get_members_display_names(
        &self,
        room_ids: &[String],
    ) -> Result<Vec<MemberDisplayName>, StoreError> {
        let data = self.data.lock().unwrap();
        let mut latest: BTreeMap<(String, String), Option<String>> = BTreeMap::new();
        for m in data
            .memberships
            .iter()
            .filter(|m| room_ids.contains(&m.room_id))
        {
            latest.insert(
                (m.room_id.clone(), m.user_id.clone()),
                m.display_name.clone(),
            );
        }
        Ok(latest
            .into_iter()
            .map(|((room_id, user_id), display_name)| MemberDisplayName {
                room_id,
                user_id,
                display_name,
            })
            .collect())
    }

    async fn get_all_clear_rooms_messages(&self) -> Result<Vec<ClearRoomMessage>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .messages
            .iter()
            .filter(|m| data.rooms.get(&m.room_id).is_some_and(|r| r.is_clear()))
            .filter(|m| !data.redactions.contains(&m.event_id))
            .map(|m| ClearRoomMessage {
                display_name: Self::latest_membership(&data, &m.room_id, &m.sender)
                    .and_then(|membership| membership.display_name),
                ..m.clone()
            })
            .collect())
    }

    async fn get_user_rooms_ids(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().unwrap();
        let mut ids: Vec<String> = data
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && !m.membership.is_empty())
            .map(|m| m.room_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn get_direct_rooms_ids(&self, room_ids: &[String]) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(room_ids
            .iter()
            .filter(|id| data.direct_rooms.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn get_direct_rooms_avatar_url(
        &self,
        room_ids: &[String],
        user_id: &str,
    ) -> Result<Vec<DirectRoomAvatar>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(room_ids
            .iter()
            .filter_map(|id| {
                let (a, b) = data.direct_rooms.get(id)?;
                let other = if a == user_id { b } else { a };
                Some(DirectRoomAvatar {
                    room_id: id.clone(),
                    avatar_url: data.avatars.get(other).cloned(),
                })
            })
            .collect())
    }

    async fn get_user_id_by_access_token(
        &self,
        token: &str,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.data.lock().unwrap().tokens.get(token).cloned())
    }

    async fn get_user_email(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.lock().unwrap().emails.get(user_id).cloned())
    }
}

pub fn event(value: Value) -> RoomEvent {
    serde_json::from_value(value).expect("valid room event")
}

pub fn message_event(room_id: &str, event_id: &str, sender: &str, body: &str) -> RoomEvent {
    event(json!({
        "type": "m.room.message",
        "room_id": room_id,
        "sender": sender,
        "event_id": event_id,
        "content": { "msgtype": "m.text", "body": body },
    }))
}

pub fn encryption_event(room_id: &str, sender: &str) -> RoomEvent {
    event(json!({
        "type": "m.room.encryption",
        "room_id": room_id,
        "sender": sender,
        "event_id": "$encryption",
        "state_key": "",
        "content": { "algorithm": "m.megolm.v1.aes-sha2" },
    }))
}

pub fn room_name_event(room_id: &str, sender: &str, name: Option<&str>) -> RoomEvent {
    let content = match name {
        Some(name) => json!({ "name": name }),
        None => json!({}),
    };
    event(json!({
        "type": "m.room.name",
        "room_id": room_id,
        "sender": sender,
        "event_id": "$name",
        "state_key": "",
        "content": content,
    }))
}
