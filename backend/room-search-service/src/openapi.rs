//! OpenAPI documentation for the room search service
use utoipa::OpenApi;

use crate::routes::search::SearchRequest;
use crate::services::query::{MessageSearchResult, RoomSearchResult, SearchResults};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Room Search Service API",
        version = "0.1.0",
        description = "Search over clear rooms, their messages and the caller's mails",
        license(
            name = "MIT"
        )
    ),
    paths(
        crate::routes::search::search,
        crate::routes::restore::restore,
        crate::routes::health::health,
    ),
    components(schemas(SearchRequest, SearchResults, RoomSearchResult, MessageSearchResult)),
    tags(
        (name = "Health", description = "Service health checks"),
        (name = "Search", description = "Room, message and mail search"),
        (name = "Admin", description = "Index maintenance"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    pub fn openapi_json_path() -> &'static str {
        "/openapi.json"
    }
}
