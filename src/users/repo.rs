use sqlx::{Executor, Sqlite};
use time::OffsetDateTime;

use super::repo_types::{UniqueField, User, UserWrite, WriteError};

const USER_COLUMNS: &str = "id, username, email, password, created_at, updated_at";

impl User {
    /// Find a user by primary key.
    pub async fn find_by_id<'e, E>(db: E, id: i64) -> anyhow::Result<Option<User>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by email.
    pub async fn find_by_email<'e, E>(db: E, email: &str) -> anyhow::Result<Option<User>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list<'e, E>(db: E, offset: i64, limit: i64) -> anyhow::Result<Vec<User>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Which unique column `username`/`email` would collide with, ignoring `exclude_id`.
    /// Username wins when both collide.
    pub async fn find_conflict<'e, E>(
        db: E,
        username: &str,
        email: &str,
        exclude_id: Option<i64>,
    ) -> anyhow::Result<Option<UniqueField>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT username, email
            FROM users
            WHERE (username = $1 OR email = $2) AND ($3 IS NULL OR id <> $3)
            ORDER BY username = $1 DESC
            LIMIT 1
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(exclude_id)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|(existing_username, _)| {
            if existing_username == username {
                UniqueField::Username
            } else {
                UniqueField::Email
            }
        }))
    }

    /// Insert a new user; `created_at` and `updated_at` both take `now`.
    pub async fn create<'e, E>(
        db: E,
        new: UserWrite<'_>,
        now: OffsetDateTime,
    ) -> Result<User, WriteError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.password)
        .bind(now)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Overwrite every writable column and refresh `updated_at`.
    pub async fn update<'e, E>(
        db: E,
        id: i64,
        changes: UserWrite<'_>,
        now: OffsetDateTime,
    ) -> Result<Option<User>, WriteError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = $1, email = $2, password = $3, updated_at = $4
            WHERE id = $5
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password)
        .bind(now)
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Returns whether a row was removed.
    pub async fn delete<'e, E>(db: E, id: i64) -> anyhow::Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
