//! Claude CLI credentials file (`~/.claude/.credentials.json`)
//!
//! The file is owned by the Claude CLI. Keys this crate does not understand are
//! carried through load/save untouched so a token refresh never drops them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse credentials JSON: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Failed to serialize credentials: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_ai_oauth: Option<OAuthCredentials>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CredentialsFile {
    pub fn parse(content: &str) -> Result<Self, TokenStoreError> {
        serde_json::from_str(content.trim()).map_err(TokenStoreError::Parse)
    }
}

/// Reads and atomically rewrites the credentials file
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenStore;

impl TokenStore {
    pub fn new() -> Self {
        Self
    }

    pub async fn load(&self, path: &Path) -> Result<CredentialsFile, TokenStoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| TokenStoreError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        CredentialsFile::parse(&content)
    }

    /// Replace the file contents in one rename so readers never see a partial write.
    pub async fn save(&self, path: &Path, file: &CredentialsFile) -> Result<(), TokenStoreError> {
        let payload = serde_json::to_vec_pretty(file).map_err(TokenStoreError::Serialize)?;
        let path = path.to_path_buf();
        let target = path.clone();
        tokio::task::spawn_blocking(move || save_blocking(&path, &payload))
            .await
            .map_err(|err| TokenStoreError::Write {
                path: target,
                source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
            })?
    }
}

fn save_blocking(path: &Path, payload: &[u8]) -> Result<(), TokenStoreError> {
    let write_err = |source: std::io::Error| TokenStoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // NamedTempFile is created 0600 on unix, which matches what the CLI writes.
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(payload).map_err(write_err)?;
    temp.flush().map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}
