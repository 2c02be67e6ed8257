use serde::Deserialize;
use tokio::sync::RwLock;

use crate::Result;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 client-credentials token source. Acquires lazily on first use and
/// caches the token in-process; callers ask for a forced [`refresh_token`]
/// after a `401`.
pub struct Auth0Client {
    http: reqwest::Client,
    domain: String,
    audience: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<String>>,
}

impl Auth0Client {
    pub fn new(domain: impl Into<String>, audience: impl Into<String>, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            domain: domain.into(),
            audience: audience.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: RwLock::new(None),
        }
    }

    /// Returns the cached token, acquiring one if this is the first call.
    pub async fn token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.refresh_token().await
    }

    /// Unconditionally acquires a fresh token and caches it, returning it.
    pub async fn refresh_token(&self) -> Result<String> {
        let response = self
            .http
            .post(format!("https://{}/oauth/token", self.domain))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("audience", self.audience.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::Error::unauthorized(format!(
                "auth0 token request failed: {}",
                response.status()
            )));
        }

        let parsed: TokenResponse = response.json().await?;
        *self.token.write().await = Some(parsed.access_token.clone());
        Ok(parsed.access_token)
    }
}
