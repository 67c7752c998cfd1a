use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use claimflow_core::{User, UserId};
use claimflow_db::repositories::user;

use crate::routes::{ApiError, AppState};

/// The caller's identity, resolved to a full active user record before any
/// handler runs. Session handling and password auth live outside this
/// service; the `X-User-Id` header is trusted at the deployment boundary.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: User,
}

const USER_HEADER: &str = "x-user-id";

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing X-User-Id header"))?;

        let user_id: i64 = raw
            .parse()
            .map_err(|_| ApiError::new(StatusCode::UNAUTHORIZED, "malformed X-User-Id header"))?;

        let user = user::find_by_id(&state.db_pool, UserId(user_id))
            .await
            .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))?
            .filter(|user| user.is_active)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "unknown or inactive user"))?;

        Ok(Principal { user })
    }
}
