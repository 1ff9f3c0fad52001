//! Credential file discovery and persistence

pub mod credential_file;
pub mod locator;

// Re-export commonly used items
pub use credential_file::{CredentialsFile, OAuthCredentials, TokenStore, TokenStoreError};
pub use locator::{CredentialLocator, DiscoveredVia, ResolvedCredentialPath};
