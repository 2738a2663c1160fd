use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,                      // assigned by the store
    pub email: String,                // unique, token subject
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 PHC string, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,   // creation timestamp
}

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
