//! Shared error envelope for the room search services.
//!
//! Every HTTP error leaves a service as an [`ErrorResponse`]. The `error`
//! field always carries a human readable message so that clients which only
//! look at `{ "error": "..." }` keep working.

use serde::{Deserialize, Serialize};

/// Unified API error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human readable message.
    pub error: String,

    /// HTTP status code.
    pub status: u16,

    /// Error class used by clients for routing, see [`error_types`].
    pub error_type: String,

    /// Stable machine code, see [`error_codes`].
    pub code: String,

    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Stable error codes.
pub mod error_codes {
    // Authentication
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const ADMIN_TOKEN_INVALID: &str = "ADMIN_TOKEN_INVALID";
    pub const RESTORE_DISABLED: &str = "RESTORE_DISABLED";

    // Search
    pub const SEARCH_VALUE_INVALID: &str = "SEARCH_VALUE_INVALID";
    pub const SEARCH_ENGINE_ERROR: &str = "SEARCH_ENGINE_ERROR";
    pub const RESTORE_FAILED: &str = "RESTORE_FAILED";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

/// Error classes.
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
