//! Access token lifecycle
//!
//! Tokens are refreshed lazily, on the path of the caller that needs one. The
//! poll cadence already bounds how stale a token can get, so there is no
//! background refresh timer.

pub mod refresh;

pub use refresh::{OAuthRefresher, RefreshError, TokenRefreshResponse, TokenRefresher};

use std::sync::Arc;

use crate::error::UsageError;
use crate::storage::{CredentialLocator, OAuthCredentials, TokenStore};

/// Refresh this long before the recorded expiry
pub const REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

pub struct TokenLifecycleManager {
    locator: Arc<CredentialLocator>,
    store: TokenStore,
    refresher: Arc<dyn TokenRefresher>,
    // Held for a whole invocation so two callers never spend the same refresh token.
    gate: tokio::sync::Mutex<()>,
}

impl TokenLifecycleManager {
    pub fn new(
        locator: Arc<CredentialLocator>,
        store: TokenStore,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            locator,
            store,
            refresher,
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn locator(&self) -> &CredentialLocator {
        &self.locator
    }

    /// A usable access token, or `None` when none can be obtained
    pub async fn get_valid_access_token(&self) -> Option<String> {
        match self.try_get_valid_access_token().await {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::debug!("No usable access token: {}", err);
                None
            }
        }
    }

    pub async fn try_get_valid_access_token(&self) -> Result<String, UsageError> {
        let _guard = self.gate.lock().await;

        let resolved = self.locator.resolve().ok_or(UsageError::CredentialNotFound)?;
        let mut file = self.store.load(&resolved.path).await?;
        let oauth = file
            .claude_ai_oauth
            .as_ref()
            .ok_or(UsageError::MissingOAuthBlock)?;

        let now_ms = chrono::Utc::now().timestamp_millis();
        if !needs_refresh(oauth.expires_at, now_ms) {
            return Ok(oauth.access_token.clone().unwrap_or_default());
        }

        let refresh_token = oauth
            .refresh_token
            .clone()
            .ok_or(UsageError::TokenExpiredNoRefreshToken)?;

        tracing::debug!("Claude access token expired or expiring, refreshing");
        let response = self.refresher.refresh(&refresh_token).await?;
        let access_token = response.access_token.clone();

        if let Some(oauth) = file.claude_ai_oauth.as_mut() {
            apply_refresh(oauth, response, &refresh_token, now_ms);
        }
        if let Err(err) = self.store.save(&resolved.path, &file).await {
            tracing::warn!("Refreshed token could not be persisted: {}", err);
        } else {
            tracing::info!("Claude token refreshed successfully");
        }

        Ok(access_token)
    }
}

/// Whether a token expiring at `expires_at` (epoch ms) must be refreshed at `now_ms`
pub fn needs_refresh(expires_at: Option<i64>, now_ms: i64) -> bool {
    match expires_at {
        Some(expires_at) => now_ms >= expires_at.saturating_sub(REFRESH_MARGIN_MS),
        None => true,
    }
}

fn apply_refresh(
    oauth: &mut OAuthCredentials,
    response: TokenRefreshResponse,
    previous_refresh_token: &str,
    now_ms: i64,
) {
    oauth.access_token = Some(response.access_token);
    // Refresh tokens are not always rotated.
    oauth.refresh_token = Some(
        response
            .refresh_token
            .unwrap_or_else(|| previous_refresh_token.to_string()),
    );
    oauth.expires_at = Some(now_ms.saturating_add(response.expires_in.saturating_mul(1000)));
    if let Some(scope) = response.scope {
        oauth.scopes = Some(scope.split_whitespace().map(str::to_string).collect());
    }
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager").finish_non_exhaustive()
    }
}
