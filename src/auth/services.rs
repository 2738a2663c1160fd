use lazy_static::lazy_static;
use tracing::{debug, info, warn};

use crate::{
    auth::{
        dto::TokenResponse,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::UserRepo,
        repo_types::{CreateUserError, User},
    },
    error::AppError,
};

lazy_static! {
    /// Verified against when the email is unknown, so both login paths pay for Argon2.
    static ref DUMMY_HASH: Option<String> = hash_password("timing-equalizer").ok();
}

/// Emails are compared after trimming and lowercasing.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<TokenResponse, AppError> {
    let email = normalize_email(email);
    let hash = hash_password(password)?;

    let user = match users.create(&email, &hash).await {
        Ok(u) => u,
        Err(CreateUserError::DuplicateEmail) => {
            warn!(email = %email, "email already registered");
            return Err(AppError::DuplicateEmail);
        }
        Err(CreateUserError::Other(e)) => return Err(AppError::Internal(e)),
    };

    let token = keys.issue(&user.email)?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(TokenResponse::bearer(token))
}

pub async fn login(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> Result<TokenResponse, AppError> {
    let email = normalize_email(email);

    let Some(user) = users.find_by_email(&email).await? else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            let _ = verify_password(password, dummy);
        }
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash) {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.issue(&user.email)?;
    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(TokenResponse::bearer(token))
}

/// Resolves a raw bearer token to its user. Every failure is `Unauthorized`.
pub async fn authenticate(
    users: &dyn UserRepo,
    keys: &JwtKeys,
    raw_token: &str,
) -> Result<User, AppError> {
    let claims = match keys.verify(raw_token) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "token rejected");
            return Err(AppError::Unauthorized);
        }
    };

    match users.find_by_email(&claims.sub).await? {
        Some(user) => Ok(user),
        None => {
            warn!("token subject has no user");
            Err(AppError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::InMemoryUserRepo;
    use crate::config::JwtConfig;
    use jsonwebtoken::Algorithm;
    use time::{Duration, OffsetDateTime};

    fn keys() -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "test-secret".into(),
            algorithm: Algorithm::HS256,
            ttl_minutes: 30,
        })
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  A@B.Com "), "a@b.com");
    }

    #[tokio::test]
    async fn register_then_login() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();

        let reg = register(&repo, &keys, "a@b.com", "secret123").await.unwrap();
        assert_eq!(reg.token_type, "bearer");
        assert_eq!(keys.verify(&reg.access_token).unwrap().sub, "a@b.com");

        let login = login(&repo, &keys, "a@b.com", "secret123").await.unwrap();
        assert_eq!(keys.verify(&login.access_token).unwrap().sub, "a@b.com");
    }

    #[tokio::test]
    async fn stored_hash_is_not_plaintext() {
        let repo = InMemoryUserRepo::new();
        register(&repo, &keys(), "a@b.com", "secret123").await.unwrap();
        let user = repo.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_ne!(user.password_hash, "secret123");
        assert!(verify_password("secret123", &user.password_hash));
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        register(&repo, &keys, "a@b.com", "secret123").await.unwrap();
        let err = register(&repo, &keys, "a@b.com", "another-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn email_case_is_ignored() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        register(&repo, &keys, "Alice@Example.com", "secret123")
            .await
            .unwrap();
        let err = register(&repo, &keys, "alice@example.com", "secret123")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));
        login(&repo, &keys, "ALICE@EXAMPLE.COM", "secret123")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_accepts_any_strings() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        register(&repo, &keys, "user", "secret123").await.unwrap();
        register(&repo, &keys, "a@b.com", "pw").await.unwrap();
        assert_eq!(repo.len().await, 2);
        login(&repo, &keys, "a@b.com", "pw").await.unwrap();
        login(&repo, &keys, "user", "secret123").await.unwrap();
    }

    #[test]
    fn dummy_hash_is_usable() {
        let dummy = DUMMY_HASH.as_deref().expect("dummy hash");
        assert!(dummy.starts_with("$argon2"));
        assert!(!verify_password("secret123", dummy));
    }

    #[tokio::test]
    async fn login_failures_look_the_same() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        register(&repo, &keys, "a@b.com", "secret123").await.unwrap();

        let wrong_pw = login(&repo, &keys, "a@b.com", "wrong").await.unwrap_err();
        let unknown = login(&repo, &keys, "x@y.com", "secret123")
            .await
            .unwrap_err();
        assert!(matches!(wrong_pw, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn authenticate_resolves_user() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        let reg = register(&repo, &keys, "a@b.com", "secret123").await.unwrap();
        let user = authenticate(&repo, &keys, &reg.access_token).await.unwrap();
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.id, 1);
    }

    #[tokio::test]
    async fn authenticate_rejects_unknown_subject() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        let token = keys.issue("ghost@b.com").unwrap();
        let err = authenticate(&repo, &keys, &token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn authenticate_rejects_expired_and_garbage_tokens() {
        let repo = InMemoryUserRepo::new();
        let keys = keys();
        register(&repo, &keys, "a@b.com", "secret123").await.unwrap();

        let expired = keys
            .issue_at("a@b.com", OffsetDateTime::now_utc() - Duration::hours(2))
            .unwrap();
        let err = authenticate(&repo, &keys, &expired).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let err = authenticate(&repo, &keys, "garbage").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}
