use actix_web::{get, web, HttpResponse};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Search engine reachable"),
        (status = 503, description = "Search engine unreachable"),
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    state.engine.ping().await.map_err(|err| {
        warn!("Health check failed: {err}");
        AppError::ServiceUnavailable("search engine unreachable".into())
    })?;

    Ok(HttpResponse::Ok().body("OK"))
}
