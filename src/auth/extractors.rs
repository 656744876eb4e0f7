use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use sqlx::SqlitePool;
use tracing::{error, warn};

use super::jwt::JwtKeys;
use crate::{error::ApiError, users::repo_types::User};

/// Pulls the token out of `Authorization: Bearer <token>`. The scheme is case-insensitive.
pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// The caller resolved from a valid bearer token.
///
/// Every verification failure becomes [`ApiError::InvalidCredentials`]; the
/// actual reason only reaches the logs.
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    SqlitePool: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::NotAuthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let email = keys.verify(token).map_err(|e| {
            warn!(reason = %e, "bearer token rejected");
            ApiError::InvalidCredentials
        })?;

        // Uses its own short checkout so it never waits on the handler's `DbConn`.
        let db = SqlitePool::from_ref(state);
        match User::find_by_email(&db, &email).await {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => {
                warn!(%email, "token subject has no user");
                Err(ApiError::InvalidCredentials)
            }
            Err(e) => {
                error!(error = %e, "current user lookup failed");
                Err(ApiError::Internal(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut req = Request::builder();
        if let Some(v) = auth {
            req = req.header(header::AUTHORIZATION, v);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(None)), None);
    }
}
