//! Request extractors resolving the caller of an endpoint.

use std::future::Future;
use std::pin::Pin;

use actix_web::{http::header, web, Error, FromRequest, HttpRequest};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Caller of `POST /search`, resolved from its homeserver access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// `None` when the account has no email; mail hits are then hidden.
    pub email: Option<String>,
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let token = bearer_token(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let token = token.ok_or(AppError::MissingCredentials)?;
            let state = state.ok_or_else(|| AppError::ServiceUnavailable("state".into()))?;

            let user_id = state
                .store
                .get_user_id_by_access_token(&token)
                .await
                .map_err(AppError::from)?
                .ok_or(AppError::AuthorizationResolution)?;
            let email = state
                .store
                .get_user_email(&user_id)
                .await
                .map_err(AppError::from)?;

            Ok::<_, Error>(AuthenticatedUser { user_id, email })
        })
    }
}

/// Proof that the request carries the configured administrative token.
#[derive(Debug, Clone, Copy)]
pub struct AdminToken;

impl FromRequest for AdminToken {
    type Error = Error;
    type Future = std::future::Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let expected = req
            .app_data::<web::Data<AppState>>()
            .and_then(|state| state.config.admin_token.clone());

        let result = match (expected, bearer_token(req)) {
            (None, _) => Err(AppError::RestoreDisabled),
            (Some(expected), Some(token)) if token == expected => Ok(AdminToken),
            (Some(_), _) => {
                warn!(path = %req.path(), "Rejected administrative request");
                Err(AppError::AdminTokenInvalid)
            }
        };

        std::future::ready(result.map_err(Error::from))
    }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}
