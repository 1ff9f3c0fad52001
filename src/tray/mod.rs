//! Tray state derivation
//!
//! Pure functions that turn a [`UsageSnapshot`] into what the tray needs to show:
//! an alert tier, the icon bucket to look up, and per-window percent/reset text.
//! Drawing the icon is left to the presentation layer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::poller::PollOutcome;
use crate::providers::{UsageSnapshot, UsageWindow, WindowKind};

pub const ELEVATED_THRESHOLD: f64 = 70.0;
pub const CRITICAL_THRESHOLD: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertTier {
    Unknown,
    Normal,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowDisplay {
    pub percent: i64,
    pub reset_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedState {
    pub tier: AlertTier,
    /// One of 0, 10, ..., 90, 95, 99, 100
    pub display_percent_for_icon: u8,
    pub windows: BTreeMap<WindowKind, WindowDisplay>,
}

pub fn derive(snapshot: &UsageSnapshot) -> DerivedState {
    derive_at(snapshot, Utc::now())
}

pub fn derive_at(snapshot: &UsageSnapshot, now: DateTime<Utc>) -> DerivedState {
    let windows = snapshot
        .windows
        .iter()
        .map(|w| (w.kind, window_display(w, now)))
        .collect();

    let max = max_utilization(snapshot);
    let tier = max.map(tier_for).unwrap_or(AlertTier::Unknown);
    let display_percent_for_icon = max
        .map(|u| snap_icon_percent(display_percent(u)))
        .unwrap_or(0);

    DerivedState {
        tier,
        display_percent_for_icon,
        windows,
    }
}

fn window_display(window: &UsageWindow, now: DateTime<Utc>) -> WindowDisplay {
    WindowDisplay {
        percent: display_percent(window.utilization),
        reset_label: window
            .resets_at
            .map(|resets_at| reset_label(resets_at, now))
            .unwrap_or_else(|| "N/A".to_string()),
    }
}

/// Highest finite utilization across windows
pub fn max_utilization(snapshot: &UsageSnapshot) -> Option<f64> {
    snapshot
        .windows
        .iter()
        .map(|w| w.utilization)
        .filter(|u| u.is_finite())
        .fold(None, |max: Option<f64>, u| Some(max.map_or(u, |m| m.max(u))))
}

/// Truncates toward zero; 72.9 shows as 72
pub fn display_percent(utilization: f64) -> i64 {
    utilization.trunc() as i64
}

pub fn tier_for(utilization: f64) -> AlertTier {
    if utilization >= CRITICAL_THRESHOLD {
        AlertTier::Critical
    } else if utilization >= ELEVATED_THRESHOLD {
        AlertTier::Elevated
    } else {
        AlertTier::Normal
    }
}

/// Icon assets exist only for 0, 10, ..., 90, 95, 99 and 100
pub fn snap_icon_percent(percent: i64) -> u8 {
    match percent {
        p if p >= 100 => 100,
        99 => 99,
        95..=98 => 95,
        p if p < 10 => 0,
        p => (p / 10 * 10) as u8,
    }
}

pub fn reset_label(resets_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = resets_at.signed_duration_since(now);
    if remaining <= Duration::zero() {
        return "now".to_string();
    }

    let days = remaining.num_days();
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;

    if days >= 1 {
        format!("{}d {}h", days, hours % 24)
    } else if hours >= 1 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Tooltip shown on the tray icon for the latest poll result
pub fn tooltip_text(outcome: &PollOutcome) -> String {
    match outcome {
        PollOutcome::NoCredentials => {
            "Claude Usage - No credentials found\nRun 'claude' to authenticate".to_string()
        }
        PollOutcome::FetchFailed => "Claude Usage - Failed to fetch data".to_string(),
        PollOutcome::Success { state, .. } => {
            let mut lines = vec!["Claude Usage".to_string()];
            for (kind, display) in &state.windows {
                lines.push(format!(
                    "{}: {}% (resets in {})",
                    kind.label(),
                    display.percent,
                    display.reset_label
                ));
            }
            lines.join("\n")
        }
    }
}
