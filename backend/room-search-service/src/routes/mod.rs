pub mod health;
pub mod restore;
pub mod search;

use actix_web::{web, HttpResponse};
use utoipa::OpenApi;

use crate::openapi::ApiDoc;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(search::search)
        .service(restore::restore)
        .service(health::health)
        .route(
            ApiDoc::openapi_json_path(),
            web::get().to(|| async { HttpResponse::Ok().json(ApiDoc::openapi()) }),
        );
}
