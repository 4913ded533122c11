use crate::errors::{AppError, AppResult};
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use uuid::Uuid;

const ACCESS_COOKIE: &str = "access_token";
const PROVIDER_COOKIE: &str = "provider_token";
const PROVIDER_HEADER: &str = "x-provider-token";

/// The signed-in user, resolved from the request's token by the backend.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
    /// OAuth token of the sign-in provider, needed by the photo picker.
    pub provider_token: Option<String>,
}

impl AuthUser {
    pub fn provider_token(&self) -> AppResult<&str> {
        self.provider_token.as_deref().ok_or_else(|| {
            AppError::ExternalService("no provider token, sign in with Google again".into())
        })
    }
}

pub struct MaybeUser(pub Option<AuthUser>);

impl MaybeUser {
    pub fn required(self) -> AppResult<AuthUser> {
        self.0.ok_or(AppError::NotAuthenticated)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(access_token) = access_token(&parts.headers) else {
            return Ok(MaybeUser(None));
        };
        let user = state
            .sync
            .backend()
            .current_user(&access_token)
            .await?
            .map(|identity| AuthUser {
                id: identity.id,
                email: identity.email,
                provider_token: provider_token(&parts.headers),
                access_token,
            });
        Ok(MaybeUser(user))
    }
}

fn access_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| cookie(headers, ACCESS_COOKIE))
}

fn provider_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PROVIDER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| cookie(headers, PROVIDER_COOKIE))
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=xyz"));
        assert_eq!(access_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn tokens_fall_back_to_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=x; access_token=xyz; provider_token=goog"),
        );
        assert_eq!(access_token(&headers).as_deref(), Some("xyz"));
        assert_eq!(provider_token(&headers).as_deref(), Some("goog"));
    }

    #[test]
    fn missing_tokens_are_none() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic zzz"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token="));
        assert_eq!(access_token(&headers), None);
        assert_eq!(provider_token(&headers), None);
    }
}
