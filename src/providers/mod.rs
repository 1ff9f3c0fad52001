//! Usage data model and the fetcher for the Claude OAuth usage endpoint

mod traits;
pub mod claude;

pub use claude::ClaudeUsageClient;
pub use traits::*;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("usage API returned HTTP {0}")]
    Status(u16),
    #[error("usage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected usage response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    #[error("access token is empty")]
    EmptyToken,
}

/// Tracked limit windows, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    FiveHour,
    SevenDay,
    SevenDayOpus,
    SevenDaySonnet,
}

impl WindowKind {
    pub fn all() -> [WindowKind; 4] {
        [
            WindowKind::FiveHour,
            WindowKind::SevenDay,
            WindowKind::SevenDayOpus,
            WindowKind::SevenDaySonnet,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            WindowKind::FiveHour => "Session",
            WindowKind::SevenDay => "Weekly",
            WindowKind::SevenDayOpus => "Weekly (Opus)",
            WindowKind::SevenDaySonnet => "Weekly (Sonnet)",
        }
    }
}

/// One rate-limit window as reported by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageWindow {
    pub kind: WindowKind,
    /// Percent of the window consumed, 0-100 (may exceed 100)
    pub utilization: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

/// All windows returned by one fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub windows: Vec<UsageWindow>,
    pub fetched_at: DateTime<Local>,
}

impl UsageSnapshot {
    pub fn new(windows: Vec<UsageWindow>) -> Self {
        Self {
            windows,
            fetched_at: Local::now(),
        }
    }

    pub fn window(&self, kind: WindowKind) -> Option<&UsageWindow> {
        self.windows.iter().find(|w| w.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
