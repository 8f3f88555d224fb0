use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::middleware::AuthenticatedUser;
use crate::services::SearchResults;
use crate::state::AppState;

/// Body of `POST /search`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    #[serde(rename = "searchValue")]
    pub search_value: String,
}

/// Search rooms, messages and mails visible to the caller.
///
/// **Endpoint**: `POST /search`
#[utoipa::path(
    post,
    path = "/search",
    tag = "Search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Matching rooms, messages and mails", body = SearchResults),
        (status = 400, description = "searchValue missing or not a string"),
        (status = 401, description = "Unknown or missing access token"),
        (status = 502, description = "Search engine failure"),
    )
)]
#[post("/search")]
pub async fn search(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let search_value = parse_search_value(&body)?;

    let results = state
        .query
        .search(&search_value, &user.user_id, user.email.as_deref())
        .await
        .map_err(|err| {
            error!(user_id = %user.user_id, "Search failed: {err}");
            AppError::from(err)
        })?;

    Ok(HttpResponse::Ok().json(results))
}

/// Malformed or non-string input maps to [`AppError::Validation`].
fn parse_search_value(body: &[u8]) -> Result<String, AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|_| AppError::Validation("request body must be a JSON object".into()))?;

    match value.get("searchValue") {
        Some(Value::String(search_value)) => Ok(search_value.clone()),
        _ => Err(AppError::Validation("searchValue must be a string".into())),
    }
}
