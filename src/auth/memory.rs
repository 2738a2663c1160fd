use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::auth::{
    repo::UserRepo,
    repo_types::{CreateUserError, User},
};

#[derive(Default)]
struct Inner {
    by_email: HashMap<String, User>,
    next_id: i64,
}

/// `UserRepo` kept in process memory. Check-and-insert happens under one lock.
#[derive(Default)]
pub struct InMemoryUserRepo {
    inner: Mutex<Inner>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.by_email.len()
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.inner.lock().await.by_email.get(email).cloned())
    }

    async fn create(&self, email: &str, password_hash: &str) -> Result<User, CreateUserError> {
        let mut inner = self.inner.lock().await;
        if inner.by_email.contains_key(email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        inner.next_id += 1;
        let user = User {
            id: inner.next_id,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        inner.by_email.insert(user.email.clone(), user.clone());
        Ok(user)
    }
}
