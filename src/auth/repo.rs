use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{CreateUserError, User};

/// Persistence for user credentials.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Exact match on the stored email.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Insert a user; uniqueness of `email` is enforced by the store itself.
    async fn create(&self, email: &str, password_hash: &str) -> Result<User, CreateUserError>;
}

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("select user by email")?;
        Ok(user)
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, CreateUserError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(CreateUserError::DuplicateEmail)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }
}
