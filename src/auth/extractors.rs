use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use super::{jwt::JwtKeys, repo_types::User, services::authenticate};
use crate::{error::AppError, state::AppState};

/// The user behind a valid `Authorization: Bearer <token>` header.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(auth) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        else {
            warn!("missing Authorization header");
            return Err(AppError::Unauthorized);
        };

        let Some(token) = bearer_token(auth) else {
            warn!("invalid auth scheme");
            return Err(AppError::Unauthorized);
        };

        let keys = JwtKeys::from_ref(state);
        let user = authenticate(state.users.as_ref(), &keys, token).await?;
        Ok(CurrentUser(user))
    }
}

/// Expect "Bearer <token>", scheme matched case-insensitively.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::bearer_token;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER abc"), Some("abc"));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("abc.def.ghi"), None);
    }
}
