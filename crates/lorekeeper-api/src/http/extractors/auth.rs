//! Bearer-token authentication extractor.
//!
//! REST calls present the same identity-provider token the WebSocket uses,
//! as `Authorization: Bearer <token>`. Verification goes through the shared
//! `ConnectionAuthorizer`, so both surfaces accept exactly the same tokens.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use lorekeeper_core::auth::ConnectionRequest;
use lorekeeper_types::auth::Decision;

use crate::http::error::AppError;
use crate::state::AppState;

/// The verified caller of a REST request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let authorization = match parts.headers.get(axum::http::header::AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                AppError::Unauthorized("Invalid Authorization header encoding".to_string())
            })?),
            None => None,
        };

        let request = ConnectionRequest {
            query_token: None,
            authorization,
        };
        authorize(state, &request).await
    }
}

/// Run the authorizer and turn a denial into a 401.
pub async fn authorize(
    state: &AppState,
    request: &ConnectionRequest<'_>,
) -> Result<AuthUser, AppError> {
    match state.authorizer.authorize(request).await {
        Decision::Allow(identity) => Ok(AuthUser {
            user_id: identity.user_id,
        }),
        Decision::Deny(reason) => Err(AppError::Unauthorized(reason.to_string())),
    }
}
