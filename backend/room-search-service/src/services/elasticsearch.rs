use async_trait::async_trait;
use elasticsearch::{
    auth::Credentials,
    cert::CertificateValidation,
    http::{
        request::JsonBody,
        response::Response,
        transport::{BuildError, SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    params::Conflicts,
    BulkParts, DeleteByQueryParts, DeleteParts, Elasticsearch, ExistsParts, MsearchParts,
    UpdateByQueryParts, UpdateParts,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use super::search_engine::{
    BulkBatch, BulkItemFailure, ByQueryOutcome, DocumentQuery, IndexFieldSpec, SearchEngine,
    SearchError, SearchHit, UpdateScript,
};

/// Hits fetched per index; results are post-filtered, never paginated.
const MAX_HITS_PER_INDEX: usize = 1000;

const NOT_FOUND: u16 = 404;

impl From<elasticsearch::Error> for SearchError {
    fn from(err: elasticsearch::Error) -> Self {
        SearchError::Transport(err.to_string())
    }
}

impl From<BuildError> for SearchError {
    fn from(err: BuildError) -> Self {
        SearchError::TransportBuild(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ElasticsearchSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub skip_tls_verify: bool,
}

/// [`SearchEngine`] backed by an Elasticsearch-compatible cluster.
#[derive(Clone)]
pub struct ElasticsearchClient {
    client: Elasticsearch,
}

impl ElasticsearchClient {
    pub fn new(settings: &ElasticsearchSettings) -> Result<Self, SearchError> {
        let parsed = Url::parse(&settings.url)?;
        let pool = SingleNodeConnectionPool::new(parsed);
        let mut builder = TransportBuilder::new(pool);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }
        if settings.skip_tls_verify {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        let transport = builder.build()?;

        Ok(Self {
            client: Elasticsearch::new(transport),
        })
    }
}

/// Accept 200-208 plus the codes a call site whitelists; everything else
/// becomes a [`SearchError::Engine`] carrying the raw body.
async fn validate(response: Response, allowed: &[u16]) -> Result<Response, SearchError> {
    let status = response.status_code().as_u16();
    if (200..=208).contains(&status) || allowed.contains(&status) {
        return Ok(response);
    }

    let body = response.text().await?;
    Err(SearchError::Engine { status, body })
}

#[async_trait]
impl SearchEngine for ElasticsearchClient {
    async fn create_index(&self, name: &str, mapping: &Value) -> Result<(), SearchError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(name))
            .body(mapping.clone())
            .send()
            .await?;

        validate(response, &[]).await?;
        debug!(index = %name, "Created search index");
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[name]))
            .send()
            .await?;

        let response = validate(response, &[NOT_FOUND]).await?;
        Ok(response.status_code().as_u16() != NOT_FOUND)
    }

    async fn index_documents(&self, batch: BulkBatch) -> Result<(), SearchError> {
        let body = bulk_body(batch);
        if body.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body.into_iter().map(JsonBody::from).collect::<Vec<_>>())
            .send()
            .await?;

        let response = validate(response, &[]).await?;
        let result: BulkResponse = response.json().await?;
        let failures = result.failures();

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
        let response = self
            .client
            .update(UpdateParts::IndexId(index, id))
            .body(json!({ "doc": fields }))
            .send()
            .await?;

        validate(response, &[]).await?;
        Ok(())
    }

    async fn update_documents(
        &self,
        index: &str,
        script: &UpdateScript,
        query: &DocumentQuery,
    ) -> Result<ByQueryOutcome, SearchError> {
        let response = self
            .client
            .update_by_query(UpdateByQueryParts::Index(&[index]))
            .conflicts(Conflicts::Proceed)
            .body(json!({
                "script": script_json(script),
                "query": query_json(query),
            }))
            .send()
            .await?;

        let response = validate(response, &[]).await?;
        let result: ByQueryResponse = response.json().await?;
        Ok(result.outcome())
    }

    async fn document_exists(&self, index: &str, id: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .exists(ExistsParts::IndexId(index, id))
            .send()
            .await?;

        let response = validate(response, &[NOT_FOUND]).await?;
        Ok(response.status_code().as_u16() != NOT_FOUND)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchError> {
        if !self.document_exists(index, id).await? {
            debug!(index = %index, id = %id, "Document already absent; delete skipped");
            return Ok(());
        }

        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await?;

        validate(response, &[NOT_FOUND]).await?;
        Ok(())
    }

    async fn delete_documents(
        &self,
        index: &str,
        query: &DocumentQuery,
    ) -> Result<ByQueryOutcome, SearchError> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .conflicts(Conflicts::Proceed)
            .body(json!({ "query": query_json(query) }))
            .send()
            .await?;

        let response = validate(response, &[]).await?;
        let result: ByQueryResponse = response.json().await?;
        Ok(result.outcome())
    }

    async fn search_on_multiple_indexes(
        &self,
        regex_value: &str,
        specs: &[IndexFieldSpec],
    ) -> Result<Vec<Vec<SearchHit>>, SearchError> {
        if specs.is_empty() {
            return Ok(vec![]);
        }

        let body = msearch_body(regex_value, specs);
        let response = self
            .client
            .msearch(MsearchParts::None)
            .body(body.into_iter().map(JsonBody::from).collect::<Vec<_>>())
            .send()
            .await?;

        let response = validate(response, &[]).await?;
        let result: MsearchResponse = response.json().await?;
        result.into_hits(specs.len())
    }

    async fn ping(&self) -> Result<(), SearchError> {
        let response = self.client.ping().send().await?;
        validate(response, &[]).await?;
        Ok(())
    }
}

fn bulk_body(batch: BulkBatch) -> Vec<Value> {
    let mut lines = Vec::new();
    for (index, documents) in batch {
        for document in documents {
            lines.push(json!({
                document.action.as_str(): { "_index": index, "_id": document.id }
            }));
            lines.push(Value::Object(document.fields));
        }
    }
    lines
}

fn query_json(query: &DocumentQuery) -> Value {
    let filters: Vec<Value> = query
        .matches
        .iter()
        .map(|(field, value)| json!({ "match": { field.as_str(): value } }))
        .collect();

    json!({ "bool": { "filter": filters } })
}

fn script_json(script: &UpdateScript) -> Value {
    match script {
        UpdateScript::SetField { field, value } => json!({
            "source": format!("ctx._source['{field}'] = params.value"),
            "lang": "painless",
            "params": { "value": value },
        }),
    }
}

fn msearch_body(regex_value: &str, specs: &[IndexFieldSpec]) -> Vec<Value> {
    let mut lines = Vec::with_capacity(specs.len() * 2);
    for spec in specs {
        let should: Vec<Value> = spec
            .fields
            .iter()
            .map(|field| {
                json!({
                    "regexp": {
                        field.as_str(): {
                            "value": regex_value,
                            "flags": "ALL",
                            "case_insensitive": true
                        }
                    }
                })
            })
            .collect();

        lines.push(json!({ "index": spec.index }));
        lines.push(json!({
            "size": MAX_HITS_PER_INDEX,
            "query": {
                "bool": {
                    "should": should,
                    "minimum_should_match": 1
                }
            }
        }));
    }
    lines
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkResponseItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkResponseItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkResponse {
    fn failures(self) -> Vec<BulkItemFailure> {
        if !self.errors {
            return vec![];
        }

        self.items
            .into_iter()
            .flat_map(|item| item.into_values())
            .filter_map(|item| {
                let error = item.error?;
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .or_else(|| error.get("type").and_then(Value::as_str))
                    .map(str::to_owned)
                    .unwrap_or_else(|| error.to_string());

                Some(BulkItemFailure {
                    index: item.index,
                    id: item.id,
                    status: item.status,
                    reason,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ByQueryResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    updated: u64,
    #[serde(default)]
    deleted: u64,
    #[serde(default)]
    version_conflicts: u64,
    #[serde(default)]
    failures: Vec<Value>,
}

impl ByQueryResponse {
    fn outcome(self) -> ByQueryOutcome {
        ByQueryOutcome {
            matched: self.total,
            applied: self.updated + self.deleted,
            version_conflicts: self.version_conflicts,
            failures: self.failures.len() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MsearchResponse {
    responses: Vec<MsearchItem>,
}

#[derive(Debug, Deserialize)]
struct MsearchItem {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    hits: Option<HitsEnvelope>,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

impl MsearchResponse {
    fn into_hits(self, expected: usize) -> Result<Vec<Vec<SearchHit>>, SearchError> {
        if self.responses.len() != expected {
            return Err(SearchError::InvalidResponse(format!(
                "expected {expected} search responses, got {}",
                self.responses.len()
            )));
        }

        self.responses
            .into_iter()
            .map(|item| {
                if let Some(error) = item.error {
                    return Err(SearchError::Engine {
                        status: item.status.unwrap_or(500),
                        body: error.to_string(),
                    });
                }

                let hits = item.hits.map(|envelope| envelope.hits).unwrap_or_default();
                Ok(hits
                    .into_iter()
                    .map(|hit| SearchHit {
                        index: hit.index,
                        id: hit.id,
                        score: hit.score,
                        source: hit.source,
                    })
                    .collect())
            })
            .collect()
    }
}
