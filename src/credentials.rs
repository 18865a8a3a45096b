use crate::error::CredentialError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Storage keys searched for the bearer token, in priority order.
///
/// The system accumulated several key names for the same logical credential
/// over time; the resolver must stay compatible with whichever one the login
/// flow currently populates. Earlier keys win and the search short-circuits
/// on the first non-empty value.
pub const TOKEN_KEYS: [&str; 6] = [
    "access_token",
    "auth_token",
    "token",
    "accessToken",
    "userToken",
    "admin_token",
];

/// File-backed credential store shared with the external login flow.
///
/// The login flow writes tokens; the core only reads them (ordered fallback
/// search) and clears them when the server reports the session expired.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Resolve the bearer token with the ordered fallback search.
    ///
    /// Returns `None` only when every known key is missing or empty; an
    /// empty string is never returned. Callers must redirect to
    /// authentication on `None`, never submit with an empty credential.
    pub async fn resolve_token(&self) -> Result<Option<String>, CredentialError> {
        let entries = self.read_entries().await?;

        for key in TOKEN_KEYS {
            if let Some(value) = entries.get(key) {
                if !value.trim().is_empty() {
                    debug!("Resolved credential from key: {}", key);
                    return Ok(Some(value.clone()));
                }
            }
        }

        info!("No credential found under any known key");
        Ok(None)
    }

    /// Store a token under the primary key. Provided for the login flow;
    /// the attendance pipeline itself never writes tokens.
    pub async fn store_token(&self, token: &str) -> Result<(), CredentialError> {
        let mut entries = self.read_entries().await?;
        entries.insert(TOKEN_KEYS[0].to_string(), token.to_string());
        self.write_entries(&entries).await
    }

    /// Remove every known token key, keeping unrelated entries intact.
    /// Used when the server reports the session expired, and by logout.
    pub async fn clear(&self) -> Result<(), CredentialError> {
        let mut entries = self.read_entries().await?;
        let before = entries.len();

        for key in TOKEN_KEYS {
            entries.remove(key);
        }

        if entries.len() != before {
            warn!("Cleared {} credential entries", before - entries.len());
        }

        self.write_entries(&entries).await
    }

    async fn read_entries(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(CredentialError::StoreRead {
                    path: self.path.display().to_string(),
                    source: e,
                })
            }
        };

        toml::from_str(&raw).map_err(|e| CredentialError::StoreParse {
            path: self.path.display().to_string(),
            source: e,
        })
    }

    async fn write_entries(
        &self,
        entries: &BTreeMap<String, String>,
    ) -> Result<(), CredentialError> {
        let serialized = toml::to_string(entries)?;

        fs::write(&self.path, serialized)
            .await
            .map_err(|e| CredentialError::StoreWrite {
                path: self.path.display().to_string(),
                source: e,
            })
    }
}
