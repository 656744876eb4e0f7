use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use sqlx::{pool::PoolConnection, Sqlite, SqlitePool};

use crate::error::ApiError;

/// Connection checked out of the pool for the duration of one request.
/// Dropping it (when the handler returns, on any path) hands it back.
pub struct DbConn(pub PoolConnection<Sqlite>);

#[async_trait]
impl<S> FromRequestParts<S> for DbConn
where
    S: Send + Sync,
    SqlitePool: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let pool = SqlitePool::from_ref(state);
        let conn = pool.acquire().await?;
        Ok(DbConn(conn))
    }
}
