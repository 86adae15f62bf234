//! Request authentication
//!
//! Authenticators map an incoming request to an external account id string.
//! Three strategies are supported: no authentication (every request lands in
//! the `default` account), a static HTTP Basic username/password pair, and
//! acoustid.biz API keys validated against the remote endpoint with an
//! in-process cache in front of it.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::cache::TtlCache;

/// How long a confirmed API key mapping stays cached.
const VALID_KEY_TTL: Duration = Duration::from_secs(60 * 60);

/// How long a rejected API key stays cached.
const INVALID_KEY_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AuthError {
    /// The request carries no acceptable credentials.
    #[error("not authorized")]
    NotAuthorized,

    /// Credential validation itself failed; not the client's fault.
    #[error("failed to check credentials: {0}")]
    Provider(String),
}

/// Maps a request to an external account id.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError>;
}

/// Accepts everything into the `default` account.
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    async fn authenticate(&self, _headers: &HeaderMap) -> Result<String, AuthError> {
        Ok("default".to_string())
    }
}

/// Static HTTP Basic credentials.
pub struct PasswordAuth {
    pub username: String,
    pub password: String,
}

#[async_trait]
impl Authenticator for PasswordAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        match parse_basic_auth(headers) {
            Some((username, password))
                if username == self.username && password == self.password =>
            {
                Ok("default".to_string())
            }
            _ => Err(AuthError::NotAuthorized),
        }
    }
}

/// API keys validated against the acoustid.biz key endpoint.
///
/// Keys arrive as the password of an HTTP Basic pair whose username is
/// `x-acoustid-api-key`. Validation results are cached: confirmed keys for an
/// hour, rejected keys for a minute.
pub struct AcoustidBizAuth {
    endpoint: String,
    username: String,
    cache: TtlCache,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ValidateApiKeyResponse {
    valid: bool,
    #[serde(default)]
    account_id: i64,
}

impl AcoustidBizAuth {
    pub fn new() -> Self {
        Self::with_endpoint("https://acoustid.biz/internal/validate-api-key")
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        AcoustidBizAuth {
            endpoint: endpoint.to_string(),
            username: "x-acoustid-api-key".to_string(),
            cache: TtlCache::new(),
            client: reqwest::Client::new(),
        }
    }

    async fn check(&self, api_key: &str) -> Result<String, AuthError> {
        let cache_key = format!("acoustid-biz-api-key:{api_key}");
        if let Some(account) = self.cache.get(&cache_key) {
            if account.is_empty() {
                return Err(AuthError::NotAuthorized);
            }
            return Ok(account);
        }

        let account = self.validate_api_key(api_key).await?;

        let ttl = if account.is_empty() {
            INVALID_KEY_TTL
        } else {
            VALID_KEY_TTL
        };
        self.cache.set(&cache_key, account.clone(), ttl);

        if account.is_empty() {
            return Err(AuthError::NotAuthorized);
        }
        Ok(account)
    }

    /// Ask the remote endpoint about an API key. Returns the external
    /// account id, or an empty string for a key the endpoint rejected.
    async fn validate_api_key(&self, api_key: &str) -> Result<String, AuthError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("api_key", api_key), ("tag", "private")])
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "HTTP error {}",
                response.status()
            )));
        }
        let doc: ValidateApiKeyResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        if !doc.valid {
            return Ok(String::new());
        }
        Ok(format!("acoustid-biz:{}", doc.account_id))
    }
}

impl Default for AcoustidBizAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for AcoustidBizAuth {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        match parse_basic_auth(headers) {
            Some((username, password))
                if username.eq_ignore_ascii_case(&self.username) && !password.is_empty() =>
            {
                self.check(&password).await
            }
            _ => Err(AuthError::NotAuthorized),
        }
    }
}

/// Decode an HTTP Basic `Authorization` header into username and password.
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, payload) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic_header(username: &str, password: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = STANDARD.encode(format!("{username}:{password}"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_no_auth_maps_to_default() {
        let auth = NoAuth;
        assert_eq!(
            auth.authenticate(&HeaderMap::new()).await.unwrap(),
            "default"
        );
    }

    #[tokio::test]
    async fn test_password_auth() {
        let auth = PasswordAuth {
            username: "user".to_string(),
            password: "secret".to_string(),
        };
        assert_eq!(
            auth.authenticate(&basic_header("user", "secret")).await.unwrap(),
            "default"
        );
        assert!(auth
            .authenticate(&basic_header("user", "wrong"))
            .await
            .is_err());
        assert!(auth.authenticate(&HeaderMap::new()).await.is_err());
    }

    #[test]
    fn test_parse_basic_auth() {
        let headers = basic_header("x-acoustid-api-key", "key123");
        assert_eq!(
            parse_basic_auth(&headers),
            Some(("x-acoustid-api-key".to_string(), "key123".to_string()))
        );
    }

    #[test]
    fn test_parse_basic_auth_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc"),
        );
        assert_eq!(parse_basic_auth(&headers), None);
        assert_eq!(parse_basic_auth(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_acoustid_biz_requires_api_key_username() {
        let auth = AcoustidBizAuth::new();
        // Wrong username never reaches the remote endpoint.
        assert!(matches!(
            auth.authenticate(&basic_header("someone", "key")).await,
            Err(AuthError::NotAuthorized)
        ));
        assert!(matches!(
            auth.authenticate(&basic_header("x-acoustid-api-key", "")).await,
            Err(AuthError::NotAuthorized)
        ));
    }

    #[tokio::test]
    async fn test_acoustid_biz_uses_cached_verdicts() {
        let auth = AcoustidBizAuth::with_endpoint("http://127.0.0.1:9/unreachable");
        auth.cache.set(
            "acoustid-biz-api-key:good",
            "acoustid-biz:42".to_string(),
            Duration::from_secs(60),
        );
        auth.cache.set(
            "acoustid-biz-api-key:bad",
            String::new(),
            Duration::from_secs(60),
        );

        let account = auth
            .authenticate(&basic_header("x-acoustid-api-key", "good"))
            .await
            .unwrap();
        assert_eq!(account, "acoustid-biz:42");

        assert!(matches!(
            auth.authenticate(&basic_header("x-acoustid-api-key", "bad"))
                .await,
            Err(AuthError::NotAuthorized)
        ));
    }
}
