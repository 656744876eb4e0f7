use axum::{extract::State, routing::post, Router};
use tracing::{info, instrument, warn};

use super::{
    dto::{LoginForm, TokenResponse},
    extractors::CurrentUser,
    jwt::JwtKeys,
    password::verify_password_blocking,
};
use crate::{
    db::DbConn,
    error::{ApiError, AppForm, AppJson},
    state::AppState,
    users::repo_types::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token", post(login_for_access_token))
        .route("/auth/refresh-token", post(refresh_access_token))
}

#[instrument(skip_all, fields(email = %form.username))]
pub async fn login_for_access_token(
    State(keys): State<JwtKeys>,
    DbConn(mut conn): DbConn,
    AppForm(form): AppForm<LoginForm>,
) -> Result<AppJson<TokenResponse>, ApiError> {
    let email = form.username.trim().to_lowercase();

    let Some(user) = User::find_by_email(&mut *conn, &email).await? else {
        warn!("login unknown email");
        return Err(ApiError::IncorrectLogin);
    };

    if !verify_password_blocking(form.password, user.password.clone()).await? {
        warn!(user_id = user.id, "login invalid password");
        return Err(ApiError::IncorrectLogin);
    }

    let access_token = keys.sign(&user.email)?;
    info!(user_id = user.id, "user logged in");
    Ok(AppJson(TokenResponse::bearer(access_token)))
}

/// Issues a fresh token for the caller. The presented token stays valid until it expires.
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn refresh_access_token(
    State(keys): State<JwtKeys>,
    CurrentUser(user): CurrentUser,
) -> Result<AppJson<TokenResponse>, ApiError> {
    let access_token = keys.sign(&user.email)?;
    info!("access token refreshed");
    Ok(AppJson(TokenResponse::bearer(access_token)))
}
