use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::User;
use crate::error::ApiError;

pub const USERNAME_MAX_LEN: usize = 50;
pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Request body for registration and full update.
#[derive(Debug, Deserialize)]
pub struct UserInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl UserInput {
    /// Trims the username, normalizes the email and checks field constraints.
    pub fn validate(mut self) -> Result<Self, ApiError> {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();

        if self.username.is_empty() {
            return Err(ApiError::Validation("username must not be empty".into()));
        }
        if self.username.chars().count() > USERNAME_MAX_LEN {
            return Err(ApiError::Validation(format!(
                "username must be at most {USERNAME_MAX_LEN} characters"
            )));
        }
        if !is_valid_email(&self.email) {
            return Err(ApiError::Validation("value is not a valid email address".into()));
        }
        if self.password.is_empty() {
            return Err(ApiError::Validation("password must not be empty".into()));
        }
        Ok(self)
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListUserResponse {
    pub users: Vec<UserResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}
fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

impl Pagination {
    pub fn validate(self) -> Result<Self, ApiError> {
        if self.offset < 0 {
            return Err(ApiError::Validation("offset must be >= 0".into()));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(self)
    }
}
