//! Failure taxonomy for one poll cycle
//!
//! Every variant is recovered inside the pipeline. Callers outside the crate only
//! ever see the collapsed [`crate::poller::PollOutcome`].

use thiserror::Error;

use crate::auth::RefreshError;
use crate::providers::FetchError;
use crate::storage::TokenStoreError;

#[derive(Error, Debug)]
pub enum UsageError {
    #[error("No credentials file found. Run 'claude' to authenticate.")]
    CredentialNotFound,
    #[error("Credentials file unreadable: {0}")]
    CredentialUnreadable(#[from] TokenStoreError),
    #[error("No claudeAiOauth section in credentials file")]
    MissingOAuthBlock,
    #[error("Access token expired and no refresh token available")]
    TokenExpiredNoRefreshToken,
    #[error("Token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),
    #[error("Usage fetch failed: {0}")]
    FetchFailed(#[from] FetchError),
    #[error("Token task aborted: {0}")]
    TaskAborted(String),
}

impl UsageError {
    /// True when the user has to re-authenticate, as opposed to a transient failure.
    pub fn is_credential_problem(&self) -> bool {
        matches!(
            self,
            UsageError::CredentialNotFound
                | UsageError::CredentialUnreadable(_)
                | UsageError::MissingOAuthBlock
                | UsageError::TokenExpiredNoRefreshToken
        )
    }
}
