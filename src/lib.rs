//! Claude Usage - rate-limit monitor
//!
//! Finds the Claude CLI credentials, keeps the OAuth access token fresh, polls
//! the usage endpoint and derives the tray state (alert tier, icon bucket,
//! per-window reset countdowns).

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod providers;
pub mod storage;
pub mod tray;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::{OAuthRefresher, TokenLifecycleManager};
use config::AppSettings;
use poller::UsagePipeline;
use providers::ClaudeUsageClient;
use storage::{CredentialLocator, TokenStore};

/// Initialize logging: stderr always, the log file when enabled
pub fn init_logging(file_logging: bool) {
    logging::set_file_logging(file_logging);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("claude_usage=info,claude_usage_lib=info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(logging::file_writer()),
        )
        .try_init();
}

/// Wire up the full pipeline for the current user
pub fn build_pipeline(settings: &AppSettings) -> Arc<UsagePipeline> {
    let locator = CredentialLocator::for_current_user(settings.effective_mount_roots());
    let refresher = OAuthRefresher::new(settings.token_url.clone(), settings.request_timeout());
    let tokens =
        TokenLifecycleManager::new(Arc::new(locator), TokenStore::new(), Arc::new(refresher));
    let fetcher = ClaudeUsageClient::new(settings.usage_url.clone(), settings.request_timeout());

    tracing::debug!("Pipeline ready (poll every {:?})", settings.refresh_interval());
    Arc::new(UsagePipeline::new(Arc::new(tokens), Arc::new(fetcher)))
}
