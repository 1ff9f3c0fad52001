//! Locates the Claude credentials file
//!
//! The CLI may live on the host or inside a Linux environment whose filesystem is
//! mounted on the host (WSL exposes distros under `\\wsl$\<distro>`). Mount roots
//! are probed first, in configured order, then the invoking user's own home.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Location of the credentials file relative to a home directory
pub const CREDENTIALS_RELATIVE_PATH: &str = ".claude/.credentials.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscoveredVia {
    DirectHost,
    RemoteHomeMount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCredentialPath {
    pub path: PathBuf,
    pub discovered_via: DiscoveredVia,
}

/// Remembers the last hit and re-checks that it still exists before handing it out
#[derive(Debug, Default)]
pub struct CachedPath {
    inner: Mutex<Option<ResolvedCredentialPath>>,
}

impl CachedPath {
    pub fn get_live(&self) -> Option<ResolvedCredentialPath> {
        let mut slot = self.inner.lock().ok()?;
        match slot.as_ref() {
            Some(cached) if cached.path.is_file() => Some(cached.clone()),
            Some(cached) => {
                tracing::debug!("Cached credentials path {:?} is gone, rescanning", cached.path);
                *slot = None;
                None
            }
            None => None,
        }
    }

    pub fn store(&self, resolved: Option<ResolvedCredentialPath>) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = resolved;
        }
    }
}

pub struct CredentialLocator {
    mount_roots: Vec<PathBuf>,
    home_dir: Option<PathBuf>,
    cache: CachedPath,
}

impl CredentialLocator {
    pub fn new(mount_roots: Vec<PathBuf>, home_dir: Option<PathBuf>) -> Self {
        Self {
            mount_roots,
            home_dir,
            cache: CachedPath::default(),
        }
    }

    /// Locator for the current user with the given mount roots
    pub fn for_current_user(mount_roots: Vec<PathBuf>) -> Self {
        Self::new(mount_roots, dirs::home_dir())
    }

    pub fn resolve(&self) -> Option<ResolvedCredentialPath> {
        if let Some(cached) = self.cache.get_live() {
            return Some(cached);
        }

        let resolved = self.scan();
        match &resolved {
            Some(hit) => tracing::debug!(
                "Resolved credentials at {:?} ({:?})",
                hit.path,
                hit.discovered_via
            ),
            None => tracing::debug!("No credentials file found in any candidate location"),
        }
        self.cache.store(resolved.clone());
        resolved
    }

    fn scan(&self) -> Option<ResolvedCredentialPath> {
        for root in &self.mount_roots {
            if let Some(path) = probe_mount_root(root) {
                return Some(ResolvedCredentialPath {
                    path,
                    discovered_via: DiscoveredVia::RemoteHomeMount,
                });
            }
        }

        let path = self.home_dir.as_ref()?.join(CREDENTIALS_RELATIVE_PATH);
        path.is_file().then_some(ResolvedCredentialPath {
            path,
            discovered_via: DiscoveredVia::DirectHost,
        })
    }
}

/// Look for `<root>/home/<user>/.claude/.credentials.json`, users in name order
fn probe_mount_root(root: &Path) -> Option<PathBuf> {
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let pattern = Path::new(&escaped_root)
        .join("home")
        .join("*")
        .join(CREDENTIALS_RELATIVE_PATH);
    let pattern = pattern.to_string_lossy().to_string();

    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!("Skipping mount root {:?}: {}", root, err);
            return None;
        }
    };

    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => return Some(path),
            Ok(_) => {}
            Err(err) => tracing::debug!("Unreadable entry under {:?}: {}", root, err),
        }
    }
    None
}

/// WSL distro shares probed when no mount roots are configured
pub fn default_mount_roots() -> Vec<PathBuf> {
    if cfg!(windows) {
        ["Ubuntu", "Ubuntu-24.04", "Ubuntu-22.04", "Debian", "kali-linux"]
            .iter()
            .map(|distro| PathBuf::from(format!(r"\\wsl$\{distro}")))
            .collect()
    } else {
        Vec::new()
    }
}
