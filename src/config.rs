//! User settings
//!
//! Read from `<config dir>/ClaudeUsage/settings.json`, then overridden by
//! `CLAUDE_USAGE_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::refresh::DEFAULT_TOKEN_URL;
use crate::providers::claude::DEFAULT_USAGE_URL;
use crate::storage::locator::default_mount_roots;

const APP_DIR_NAME: &str = "ClaudeUsage";
const SETTINGS_FILENAME: &str = "settings.json";

pub const ENV_REFRESH_SECS: &str = "CLAUDE_USAGE_REFRESH_SECS";
pub const ENV_MOUNT_ROOTS: &str = "CLAUDE_USAGE_MOUNT_ROOTS";
pub const ENV_FILE_LOG: &str = "CLAUDE_USAGE_FILE_LOG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub refresh_interval_seconds: u64,
    pub request_timeout_seconds: u64,
    /// `None` probes the platform defaults (WSL distro shares on Windows)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_roots: Option<Vec<PathBuf>>,
    pub usage_url: String,
    pub token_url: String,
    pub file_logging: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 120,
            request_timeout_seconds: 30,
            mount_roots: None,
            usage_url: DEFAULT_USAGE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            file_logging: false,
        }
    }
}

impl AppSettings {
    /// Settings file plus environment overrides; never fails
    pub fn load() -> Self {
        let mut settings = match settings_path() {
            Ok(path) => Self::load_from(&path),
            Err(err) => {
                tracing::debug!("{:#}", err);
                Self::default()
            }
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    pub fn load_from(path: &Path) -> Self {
        match Self::read(path) {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(err) => {
                tracing::warn!("Ignoring settings file: {:#}", err);
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        settings.validate()?;
        Ok(Some(settings))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = var(ENV_REFRESH_SECS).and_then(|v| v.trim().parse::<u64>().ok()) {
            self.refresh_interval_seconds = secs;
        }
        if let Some(roots) = var(ENV_MOUNT_ROOTS) {
            let roots: Vec<PathBuf> = std::env::split_paths(&roots)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            self.mount_roots = Some(roots);
        }
        if let Some(flag) = var(ENV_FILE_LOG) {
            self.file_logging = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.usage_url).context("Invalid usageUrl")?;
        url::Url::parse(&self.token_url).context("Invalid tokenUrl")?;
        if self.refresh_interval_seconds == 0 {
            anyhow::bail!("refreshIntervalSeconds must be greater than zero");
        }
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("requestTimeoutSeconds must be greater than zero");
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn effective_mount_roots(&self) -> Vec<PathBuf> {
        self.mount_roots.clone().unwrap_or_else(default_mount_roots)
    }
}

pub fn settings_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().expect("tempdir");
        let settings = AppSettings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.refresh_interval(), Duration::from_secs(120));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"refreshIntervalSeconds": 60, "mountRoots": ["/mnt/wsl/Ubuntu"]}"#,
        )
        .expect("write");

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.refresh_interval_seconds, 60);
        assert_eq!(
            settings.effective_mount_roots(),
            vec![PathBuf::from("/mnt/wsl/Ubuntu")]
        );
        assert_eq!(settings.usage_url, DEFAULT_USAGE_URL);
    }

    #[test]
    fn malformed_or_invalid_file_falls_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ nope").expect("write");
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());

        fs::write(&path, r#"{"usageUrl": "not a url"}"#).expect("write");
        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_REFRESH_SECS, " 30 "),
            (ENV_FILE_LOG, "true"),
        ]);
        let mut settings = AppSettings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.refresh_interval_seconds, 30);
        assert!(settings.file_logging);
        assert!(settings.mount_roots.is_none());
    }

    #[test]
    fn env_mount_roots_replace_defaults() {
        let joined = std::env::join_paths(["/mnt/a", "/mnt/b"]).expect("join");
        let joined = joined.to_string_lossy().to_string();
        let mut settings = AppSettings::default();
        settings.apply_env(|key| (key == ENV_MOUNT_ROOTS).then(|| joined.clone()));
        assert_eq!(
            settings.effective_mount_roots(),
            vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]
        );
    }
}
