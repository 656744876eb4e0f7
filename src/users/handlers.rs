use axum::{extract::State, http::StatusCode, routing::get, Router};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    dto::{ListUserResponse, Message, Pagination, UserInput, UserResponse},
    repo_types::{User, UserWrite},
};
use crate::{
    auth::{extractors::CurrentUser, password::hash_password_blocking},
    db::DbConn,
    error::{ApiError, AppJson, AppPath, AppQuery},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

// `CurrentUser` goes before `DbConn` so its lookup has returned its connection
// before the request checks one out. Handlers that hash a password take the
// pool instead and acquire only once the hash is ready.
//
// Writes run in autocommit. The conflict pre-check names the colliding field;
// a concurrent writer that slips past it still hits the unique index, which
// `WriteError` maps to the same 409.

#[instrument(skip_all)]
pub async fn create_user(
    State(db): State<SqlitePool>,
    AppJson(input): AppJson<UserInput>,
) -> Result<(StatusCode, AppJson<UserResponse>), ApiError> {
    let input = input.validate()?;
    let password = hash_password_blocking(input.password).await?;

    let mut conn = db.acquire().await?;
    if let Some(field) =
        User::find_conflict(&mut *conn, &input.username, &input.email, None).await?
    {
        warn!(%field, "registration conflict");
        return Err(ApiError::Conflict(field));
    }
    let user = User::create(
        &mut *conn,
        UserWrite {
            username: &input.username,
            email: &input.email,
            password: &password,
        },
        OffsetDateTime::now_utc(),
    )
    .await?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, AppJson(user.into())))
}

#[instrument(skip_all, fields(user_id = id))]
pub async fn get_user(
    DbConn(mut conn): DbConn,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<UserResponse>, ApiError> {
    let user = User::find_by_id(&mut *conn, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(AppJson(user.into()))
}

#[instrument(skip_all, fields(offset = page.offset, limit = page.limit))]
pub async fn list_users(
    DbConn(mut conn): DbConn,
    AppQuery(page): AppQuery<Pagination>,
) -> Result<AppJson<ListUserResponse>, ApiError> {
    let page = page.validate()?;
    let users = User::list(&mut *conn, page.offset, page.limit).await?;
    Ok(AppJson(ListUserResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
    }))
}

#[instrument(skip_all, fields(caller = current.id, target = id))]
pub async fn update_user(
    CurrentUser(current): CurrentUser,
    State(db): State<SqlitePool>,
    AppPath(id): AppPath<i64>,
    AppJson(input): AppJson<UserInput>,
) -> Result<AppJson<UserResponse>, ApiError> {
    if current.id != id {
        warn!("update of another user refused");
        return Err(ApiError::Forbidden);
    }
    let input = input.validate()?;
    let password = hash_password_blocking(input.password).await?;

    let mut conn = db.acquire().await?;
    if let Some(field) =
        User::find_conflict(&mut *conn, &input.username, &input.email, Some(id)).await?
    {
        warn!(%field, "update conflict");
        return Err(ApiError::Conflict(field));
    }
    let user = User::update(
        &mut *conn,
        id,
        UserWrite {
            username: &input.username,
            email: &input.email,
            password: &password,
        },
        OffsetDateTime::now_utc(),
    )
    .await?
    .ok_or(ApiError::NotFound)?;

    info!("user updated");
    Ok(AppJson(user.into()))
}

#[instrument(skip_all, fields(caller = current.id, target = id))]
pub async fn delete_user(
    CurrentUser(current): CurrentUser,
    DbConn(mut conn): DbConn,
    AppPath(id): AppPath<i64>,
) -> Result<AppJson<Message>, ApiError> {
    if current.id != id {
        warn!("delete of another user refused");
        return Err(ApiError::Forbidden);
    }
    if !User::delete(&mut *conn, id).await? {
        return Err(ApiError::NotFound);
    }
    info!("user deleted");
    Ok(AppJson(Message {
        message: "User deleted".into(),
    }))
}
