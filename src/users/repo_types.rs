use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String, // Argon2 hash, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Column carrying a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    pub fn column(self) -> &'static str {
        match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Values written on insert or full update. `password` is already hashed.
#[derive(Debug, Clone)]
pub struct UserWrite<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("{0} already exists")]
    Duplicate(UniqueField),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for WriteError {
    fn from(e: sqlx::Error) -> Self {
        match duplicate_field(&e) {
            Some(field) => WriteError::Duplicate(field),
            None => WriteError::Other(e.into()),
        }
    }
}

/// Classifies a unique violation by the constraint it hit.
///
/// Postgres reports the index name through `constraint()`; SQLite only names
/// the column in the message (`UNIQUE constraint failed: users.email`).
pub fn duplicate_field(e: &sqlx::Error) -> Option<UniqueField> {
    let db = e.as_database_error()?;
    if !db.is_unique_violation() {
        return None;
    }
    let source = db.constraint().unwrap_or_else(|| db.message());
    [UniqueField::Username, UniqueField::Email]
        .into_iter()
        .find(|f| {
            source.contains(&format!("users.{}", f.column()))
                || source.contains(&format!("ix_users_{}", f.column()))
        })
}
