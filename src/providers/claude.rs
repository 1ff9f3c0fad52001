//! Claude usage client
//!
//! Reads rate-limit utilization from the OAuth usage endpoint
//! (api.anthropic.com) with a bearer token taken from the Claude CLI credentials.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::{FetchError, UsageFetcher, UsageSnapshot, UsageWindow, WindowKind};

pub const DEFAULT_USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const OAUTH_BETA_HEADER: &str = "oauth-2025-04-20";

pub struct ClaudeUsageClient {
    client: reqwest::Client,
    usage_url: String,
    user_agent: String,
}

impl ClaudeUsageClient {
    pub fn new(usage_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            usage_url: usage_url.into(),
            user_agent: format!("claude-usage/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn convert_response(&self, response: OAuthUsageResponse) -> UsageSnapshot {
        let windows = [
            (WindowKind::FiveHour, response.five_hour),
            (WindowKind::SevenDay, response.seven_day),
            (WindowKind::SevenDayOpus, response.seven_day_opus),
            (WindowKind::SevenDaySonnet, response.seven_day_sonnet),
        ]
        .into_iter()
        .filter_map(|(kind, window)| {
            window.map(|w| UsageWindow {
                kind,
                utilization: w.utilization.unwrap_or(0.0),
                resets_at: w.resets_at.as_deref().and_then(parse_reset_time),
            })
        })
        .collect();

        UsageSnapshot::new(windows)
    }
}

#[async_trait]
impl UsageFetcher for ClaudeUsageClient {
    fn name(&self) -> &'static str {
        "Claude"
    }

    async fn try_fetch(&self, access_token: &str) -> Result<UsageSnapshot, FetchError> {
        if access_token.is_empty() {
            return Err(FetchError::EmptyToken);
        }

        let response = self
            .client
            .get(&self.usage_url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .header("anthropic-beta", OAUTH_BETA_HEADER)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let usage_response: OAuthUsageResponse = serde_json::from_slice(&body)?;
        Ok(self.convert_response(usage_response))
    }
}

/// Unparsable timestamps drop only the reset time, not the window
fn parse_reset_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// ---- OAuth Response Types ----

#[derive(Debug, Deserialize)]
struct OAuthUsageResponse {
    #[serde(default)]
    five_hour: Option<OAuthUsageWindow>,
    #[serde(default)]
    seven_day: Option<OAuthUsageWindow>,
    #[serde(default)]
    seven_day_opus: Option<OAuthUsageWindow>,
    #[serde(default, alias = "sonnet_only")]
    seven_day_sonnet: Option<OAuthUsageWindow>,
}

#[derive(Debug, Deserialize)]
struct OAuthUsageWindow {
    #[serde(default)]
    utilization: Option<f64>,
    #[serde(default)]
    resets_at: Option<String>,
}
