use actix_web::{post, web, HttpResponse};
use tracing::{error, info};

use crate::error::AppError;
use crate::middleware::AdminToken;
use crate::state::AppState;

/// Create missing indices and backfill them from the room store.
///
/// Runs even when startup bootstrap is disabled. Existing indices are kept.
#[utoipa::path(
    post,
    path = "/opensearch/restore",
    tag = "Admin",
    responses(
        (status = 204, description = "Restore finished"),
        (status = 403, description = "Restore disabled or invalid administrative token"),
        (status = 500, description = "Restore failed"),
    )
)]
#[post("/opensearch/restore")]
pub async fn restore(
    state: web::Data<AppState>,
    _admin: AdminToken,
) -> Result<HttpResponse, AppError> {
    match state.bootstrapper.run().await {
        Ok(report) => {
            info!(
                created = ?report.created_indices,
                rooms = report.rooms_backfilled,
                messages = report.messages_backfilled,
                "Manual restore finished"
            );
            Ok(HttpResponse::NoContent().finish())
        }
        Err(err) => {
            error!("Manual restore failed: {err:?}");
            Err(AppError::RestoreFailed)
        }
    }
}
