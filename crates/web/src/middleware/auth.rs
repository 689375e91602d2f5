use std::collections::HashSet;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use scoring::models::Identity;

use crate::error::WebError;

pub const IDENTITY_ID_HEADER: &str = "x-identity-id";
pub const IDENTITY_NAME_HEADER: &str = "x-identity-name";
pub const IDENTITY_AVATAR_HEADER: &str = "x-identity-avatar";

/// Rejects requests without a known `Authorization: Bearer` API key.
pub async fn require_auth(
    State(api_keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Result<Response, WebError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match token {
        Some(token) if api_keys.is_valid(token) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key attempt");
            Err(WebError::Unauthorized)
        }
        None => Err(WebError::Unauthorized),
    }
}

#[derive(Clone)]
pub struct ApiKeys {
    keys: HashSet<String>,
}

impl ApiKeys {
    pub fn from_comma_separated(keys_str: &str) -> Self {
        let keys = keys_str
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self { keys }
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The caller as authenticated by the upstream gateway.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl Caller {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let external_id = read(IDENTITY_ID_HEADER)?;
        let display_name = read(IDENTITY_NAME_HEADER).unwrap_or(external_id);

        let mut identity = Identity::new(external_id, display_name);
        identity.avatar_url = read(IDENTITY_AVATAR_HEADER).map(String::from);
        Some(Self(identity))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers).ok_or(WebError::MissingIdentity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_api_keys_parsing() {
        let keys = ApiKeys::from_comma_separated(" alpha, ,beta ");
        assert!(keys.is_valid("alpha"));
        assert!(keys.is_valid("beta"));
        assert!(!keys.is_valid(""));
        assert!(ApiKeys::from_comma_separated("").is_empty());
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(Caller::from_headers(&headers).is_none());

        headers.insert(IDENTITY_ID_HEADER, HeaderValue::from_static("alice"));
        let Caller(identity) = Caller::from_headers(&headers).unwrap();
        assert_eq!(identity.external_id, "alice");
        assert_eq!(identity.display_name, "alice");
        assert!(identity.avatar_url.is_none());

        headers.insert(IDENTITY_NAME_HEADER, HeaderValue::from_static("Alice Liddell"));
        headers.insert(
            IDENTITY_AVATAR_HEADER,
            HeaderValue::from_static("https://example.com/a.png"),
        );
        let Caller(identity) = Caller::from_headers(&headers).unwrap();
        assert_eq!(identity.display_name, "Alice Liddell");
        assert_eq!(
            identity.avatar_url.as_deref(),
            Some("https://example.com/a.png")
        );
    }
}
