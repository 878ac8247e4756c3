//! OAuth token persistence.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Seconds shaved off `expires_in` so a token is refreshed before Google
/// starts rejecting it.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Access and refresh token as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl TokenInfo {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(expiry_from_now),
            scopes,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Applies a refresh response. Google does not always rotate the refresh
    /// token; the old one is kept unless a new one is supplied.
    pub fn refreshed(
        mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) -> Self {
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(expiry_from_now);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self
    }
}

fn expiry_from_now(secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// JSON token file with owner-only permissions.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no token has been saved yet.
    pub fn load(&self) -> ProviderResult<Option<TokenInfo>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token file");
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to read token file: {}", e))
                .with_provider("google")
        })?;
        let token = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!("failed to parse token file: {}", e))
                .with_provider("google")
        })?;
        Ok(Some(token))
    }

    /// Writes through a temporary file and renames it into place.
    pub fn save(&self, token: &TokenInfo) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(token).map_err(|e| {
            ProviderError::internal(format!("failed to serialize token: {}", e))
        })?;
        fs::write(&temp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, &self.path)?;
        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }

    pub fn clear(&self) -> ProviderResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "removed stored token");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_valid() {
        let token = TokenInfo::new("a", Some("r".into()), Some(3600), vec!["s".into()]);
        assert!(!token.is_expired());
        assert!(token.has_scopes(&["s".to_string()]));
        assert!(!token.has_scopes(&["other".to_string()]));
    }

    #[test]
    fn short_lived_token_counts_as_expired() {
        let token = TokenInfo::new("a", None, Some(30), vec![]);
        assert!(token.is_expired());
        assert!(!TokenInfo::new("a", None, None, vec![]).is_expired());
    }

    #[test]
    fn refresh_keeps_old_refresh_token() {
        let token = TokenInfo::new("a", Some("r".into()), Some(30), vec![]);
        let refreshed = token.refreshed("b", Some(3600), None);
        assert_eq!(refreshed.access_token, "b");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("r"));
        assert!(!refreshed.is_expired());
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));
        assert_eq!(store.load().unwrap(), None);

        let token = TokenInfo::new("a", Some("r".into()), Some(3600), vec!["s".into()]);
        store.save(&token).unwrap();
        assert_eq!(store.load().unwrap(), Some(token));
        assert!(!store.path().with_extension("json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.clear().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn corrupt_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "{").unwrap();
        let err = TokenStore::new(path).load().unwrap_err();
        assert_eq!(err.code(), crate::error::ProviderErrorCode::ConfigurationError);
    }
}
