//! OAuth refresh-token exchange

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("token endpoint returned HTTP {0}")]
    Status(u16),
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid token response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the new access token in seconds
    pub expires_in: i64,
    /// Space-delimited
    #[serde(default)]
    pub scope: Option<String>,
}

/// Exchanges a refresh token for a new access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, RefreshError>;
}

pub struct OAuthRefresher {
    client: reqwest::Client,
    token_url: String,
}

impl OAuthRefresher {
    pub fn new(token_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            token_url: token_url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, RefreshError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }

        // Read the body first so a malformed payload surfaces as InvalidResponse.
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
