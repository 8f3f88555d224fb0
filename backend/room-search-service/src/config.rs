use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

use crate::error::AppError;
use crate::events::kafka::KafkaConsumerConfig;
use crate::services::elasticsearch::ElasticsearchSettings;

const MAX_BACKFILL_BATCH_SIZE: usize = 10_000;

/// Names of the indices this service reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    pub rooms: String,
    pub messages: String,
    /// Written by the mail indexer; only queried here.
    pub mails: String,
}

impl Default for IndexNames {
    fn default() -> Self {
        Self {
            rooms: "rooms".to_string(),
            messages: "messages".to_string(),
            mails: "mails".to_string(),
        }
    }
}

/// Which indexed messages a member display-name change rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayNameScope {
    /// Every message from the sender, in any room.
    #[default]
    Global,
    /// Only the sender's messages in the room where the change happened.
    Room,
}

impl FromStr for DisplayNameScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(DisplayNameScope::Global),
            "room" => Ok(DisplayNameScope::Room),
            other => Err(AppError::Config(format!(
                "SEARCH_DISPLAY_NAME_SCOPE must be 'global' or 'room', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub search_engine: ElasticsearchSettings,
    pub indices: IndexNames,
    pub bootstrap_on_startup: bool,
    pub backfill_batch_size: usize,
    pub display_name_scope: DisplayNameScope,
    pub admin_token: Option<String>,
    pub kafka: Option<KafkaConsumerConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let database_url =
            var("DATABASE_URL").ok_or_else(|| AppError::Config("DATABASE_URL missing".into()))?;
        let database_max_connections = parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?;
        let port = parse_or(&var, "PORT", 8080)?;

        let url = var("SEARCH_ENGINE_URL")
            .ok_or_else(|| AppError::Config("SEARCH_ENGINE_URL missing".into()))?;
        let (username, password) = match (
            var("SEARCH_ENGINE_USERNAME"),
            var("SEARCH_ENGINE_PASSWORD"),
        ) {
            (Some(username), Some(password)) => (Some(username), Some(password)),
            (None, None) => (None, None),
            _ => {
                return Err(AppError::Config(
                    "SEARCH_ENGINE_USERNAME and SEARCH_ENGINE_PASSWORD must be set together"
                        .into(),
                ))
            }
        };
        let search_engine = ElasticsearchSettings {
            url,
            username,
            password,
            skip_tls_verify: parse_or(&var, "SEARCH_ENGINE_SKIP_TLS_VERIFY", false)?,
        };

        let defaults = IndexNames::default();
        let indices = IndexNames {
            rooms: var("SEARCH_ROOMS_INDEX").unwrap_or(defaults.rooms),
            messages: var("SEARCH_MESSAGES_INDEX").unwrap_or(defaults.messages),
            mails: var("SEARCH_MAILS_INDEX").unwrap_or(defaults.mails),
        };

        let backfill_batch_size = parse_or(&var, "SEARCH_BACKFILL_BATCH_SIZE", 500usize)?;
        if !(1..=MAX_BACKFILL_BATCH_SIZE).contains(&backfill_batch_size) {
            return Err(AppError::Config(format!(
                "SEARCH_BACKFILL_BATCH_SIZE must be between 1 and {MAX_BACKFILL_BATCH_SIZE}"
            )));
        }

        let display_name_scope = match var("SEARCH_DISPLAY_NAME_SCOPE") {
            Some(value) => value.parse()?,
            None => DisplayNameScope::default(),
        };

        let kafka = var("KAFKA_BROKERS").map(|brokers| KafkaConsumerConfig {
            brokers,
            group_id: var("KAFKA_SEARCH_GROUP_ID")
                .unwrap_or_else(|| "room-search-service".to_string()),
            room_events_topic: var("KAFKA_ROOM_EVENTS_TOPIC")
                .unwrap_or_else(|| "room_events".to_string()),
        });

        Ok(Self {
            database_url,
            database_max_connections,
            port,
            search_engine,
            indices,
            bootstrap_on_startup: parse_or(&var, "SEARCH_BOOTSTRAP_ON_STARTUP", true)?,
            backfill_batch_size,
            display_name_scope,
            admin_token: var("SEARCH_ADMIN_TOKEN"),
            kafka,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}
