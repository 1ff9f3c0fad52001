//! Usage fetcher trait definition

use async_trait::async_trait;
use super::{FetchError, UsageSnapshot};

/// Trait for fetching a usage snapshot with an already-valid access token
#[async_trait]
pub trait UsageFetcher: Send + Sync {
    /// Fetch the current usage, keeping the failure reason
    async fn try_fetch(&self, access_token: &str) -> Result<UsageSnapshot, FetchError>;

    /// Get the provider name for display
    fn name(&self) -> &'static str;

    /// Fetch the current usage; unauthorized, network and parse failures all collapse to `None`
    async fn fetch(&self, access_token: &str) -> Option<UsageSnapshot> {
        match self.try_fetch(access_token).await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::debug!("{} usage fetch failed: {}", self.name(), err);
                None
            }
        }
    }
}
