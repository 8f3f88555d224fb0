//! Search engine capability used by the synchronization and query services.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Per-document failure reported inside a bulk response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemFailure {
    pub index: String,
    pub id: String,
    pub status: u16,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search engine responded with status {status}: {body}")]
    Engine { status: u16, body: String },
    #[error("bulk request rejected {} document(s)", failures.len())]
    BulkFailure { failures: Vec<BulkItemFailure> },
    #[error("invalid search engine URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build transport: {0}")]
    TransportBuild(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected search engine response: {0}")]
    InvalidResponse(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SearchError {
    /// Status code returned by the engine, when the failure came from it.
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchError::Engine { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Bulk write semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    /// Fails for this document if its id already exists.
    Create,
    /// Upsert.
    Index,
}

impl BulkAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkAction::Create => "create",
            BulkAction::Index => "index",
        }
    }
}

/// One document of a bulk call.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    pub id: String,
    pub action: BulkAction,
    pub fields: Map<String, Value>,
}

impl BulkDocument {
    /// Build a bulk entry from any serializable document. The `id` is kept
    /// in the source as well so hits expose it without reading `_id`.
    pub fn from_document<T: Serialize>(
        id: impl Into<String>,
        action: BulkAction,
        document: &T,
    ) -> Result<Self, SearchError> {
        let fields = match serde_json::to_value(document)? {
            Value::Object(fields) => fields,
            other => {
                return Err(SearchError::InvalidResponse(format!(
                    "document must serialize to an object, got {other}"
                )))
            }
        };

        Ok(Self {
            id: id.into(),
            action,
            fields,
        })
    }
}

/// Documents grouped by target index, sent in a single round trip.
pub type BulkBatch = BTreeMap<String, Vec<BulkDocument>>;

/// Conjunction of exact field matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub matches: Vec<(String, String)>,
}

impl DocumentQuery {
    pub fn field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            matches: vec![(field.into(), value.into())],
        }
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.matches.push((field.into(), value.into()));
        self
    }

    pub fn is_match(&self, source: &Map<String, Value>) -> bool {
        self.matches
            .iter()
            .all(|(field, expected)| source.get(field).and_then(Value::as_str) == Some(expected))
    }
}

/// Server-side mutation applied to every document matching a query.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateScript {
    SetField { field: String, value: Value },
}

/// Outcome of a by-query update or delete run with the "proceed" conflict
/// policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByQueryOutcome {
    pub matched: u64,
    pub applied: u64,
    pub version_conflicts: u64,
    pub failures: u64,
}

/// Fields searched on one index of a multi-index search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFieldSpec {
    pub index: String,
    pub fields: Vec<String>,
}

impl IndexFieldSpec {
    pub fn new(index: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            index: index.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A raw search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub index: String,
    pub id: String,
    pub score: Option<f64>,
    pub source: Map<String, Value>,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Create an index. The engine rejects re-creation of an existing index,
    /// so callers check [`SearchEngine::index_exists`] first.
    async fn create_index(&self, name: &str, mapping: &Value) -> Result<(), SearchError>;

    async fn index_exists(&self, name: &str) -> Result<bool, SearchError>;

    /// Write documents to one or more indices in a single bulk call. Any
    /// per-document failure surfaces as [`SearchError::BulkFailure`].
    async fn index_documents(&self, batch: BulkBatch) -> Result<(), SearchError>;

    /// Merge `fields` into an existing document; fails if it does not exist.
    async fn update_document(
        &self,
        index: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), SearchError>;

    /// Apply `script` to every document matching `query`, proceeding past
    /// version conflicts.
    async fn update_documents(
        &self,
        index: &str,
        script: &UpdateScript,
        query: &DocumentQuery,
    ) -> Result<ByQueryOutcome, SearchError>;

    async fn document_exists(&self, index: &str, id: &str) -> Result<bool, SearchError>;

    /// Delete one document; a missing document is a no-op.
    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError>;

    /// Delete every document matching `query`, proceeding past version
    /// conflicts.
    async fn delete_documents(
        &self,
        index: &str,
        query: &DocumentQuery,
    ) -> Result<ByQueryOutcome, SearchError>;

    /// Match `regex_value` against the given fields of each index in one
    /// request. Hit lists come back in the order of `specs`.
    async fn search_on_multiple_indexes(
        &self,
        regex_value: &str,
        specs: &[IndexFieldSpec],
    ) -> Result<Vec<Vec<SearchHit>>, SearchError>;

    async fn ping(&self) -> Result<(), SearchError>;
}
