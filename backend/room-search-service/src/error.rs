use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use thiserror::Error;

use crate::services::query::QueryError;
use crate::services::room_store::StoreError;
use crate::services::search_engine::SearchError;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("{0}")]
    Validation(String),

    #[error("missing bearer token")]
    MissingCredentials,

    #[error("access token does not belong to a known account")]
    AuthorizationResolution,

    #[error("invalid administrative token")]
    AdminTokenInvalid,

    #[error("restore is disabled on this instance")]
    RestoreDisabled,

    #[error("search engine error")]
    SearchEngine(String),

    #[error("database error")]
    Database(String),

    #[error("restore failed")]
    RestoreFailed,

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn kind_and_code(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::SEARCH_VALUE_INVALID),
            AppError::MissingCredentials => {
                (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_MISSING)
            }
            AppError::AuthorizationResolution => {
                (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_INVALID)
            }
            AppError::AdminTokenInvalid => {
                (kinds::AUTHORIZATION_ERROR, error_codes::ADMIN_TOKEN_INVALID)
            }
            AppError::RestoreDisabled => (kinds::AUTHORIZATION_ERROR, error_codes::RESTORE_DISABLED),
            AppError::SearchEngine(_) => (kinds::SERVER_ERROR, error_codes::SEARCH_ENGINE_ERROR),
            AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
            AppError::RestoreFailed => (kinds::SERVER_ERROR, error_codes::RESTORE_FAILED),
            AppError::ServiceUnavailable(_) => (
                kinds::SERVICE_UNAVAILABLE_ERROR,
                error_codes::SERVICE_UNAVAILABLE,
            ),
            AppError::Config(_) | AppError::StartServer(_) => {
                (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingCredentials | AppError::AuthorizationResolution => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AdminTokenInvalid | AppError::RestoreDisabled => StatusCode::FORBIDDEN,
            AppError::SearchEngine(_) => StatusCode::BAD_GATEWAY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_)
            | AppError::RestoreFailed
            | AppError::Config(_)
            | AppError::StartServer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error_type, code) = self.kind_and_code();
        let body = ErrorResponse::new(&self.to_string(), status.as_u16(), error_type, code);

        HttpResponse::build(status).json(body)
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        AppError::SearchEngine(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Validation(msg) => AppError::Validation(msg),
            QueryError::Search(err) => err.into(),
            QueryError::Store(err) => err.into(),
        }
    }
}
