//! OAuth token persistence.
//!
//! Tokens are kept in a JSON file readable only by the owner. Writes go to a
//! temporary file first and are renamed into place.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// Tokens count as expired this long before Google's stated expiry.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

/// The token set of one authorized session.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    /// Absent when Google did not grant offline access.
    pub refresh_token: Option<String>,
    /// Expiry with the safety margin already applied. `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes Google reported as granted.
    pub scopes: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenInfo")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl TokenInfo {
    /// Builds a token set from a token endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in.map(|secs| expiry_after(now, secs)),
            scopes,
            updated_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Returns true if every scope in `required` was granted.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Records the result of a refresh grant.
    ///
    /// Google rotates the refresh token only sometimes, so the stored one is
    /// replaced only when a new one is given.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        expires_in: Option<i64>,
        rotated_refresh_token: Option<String>,
    ) {
        let now = Utc::now();
        self.access_token = access_token.into();
        self.expires_at = expires_in.map(|secs| expiry_after(now, secs));
        if let Some(token) = rotated_refresh_token {
            self.refresh_token = Some(token);
        }
        self.updated_at = now;
    }
}

fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + Duration::seconds(expires_in) - EXPIRY_MARGIN
}

/// The token file on disk.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the stored tokens. A missing file is not an error.
    pub fn load(&self) -> ProviderResult<Option<TokenInfo>> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored Google tokens");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error("cannot read", e)),
        };

        let tokens = serde_json::from_str(&json).map_err(|e| {
            ProviderError::configuration(format!(
                "token file {} is corrupt ({}); delete it to authorize again",
                self.path.display(),
                e
            ))
        })?;
        debug!(path = %self.path.display(), "loaded Google tokens");
        Ok(Some(tokens))
    }

    /// Writes the tokens with owner-only permissions.
    pub fn save(&self, tokens: &TokenInfo) -> ProviderResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error("cannot create directory for", e))?;
        }

        let json = serde_json::to_string_pretty(tokens)
            .map_err(|e| ProviderError::internal(format!("cannot encode tokens: {}", e)))?;
        let staging = self.staging_path();
        fs::write(&staging, json).map_err(|e| self.io_error("cannot write", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staging, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error("cannot restrict permissions of", e))?;
        }

        fs::rename(&staging, &self.path).map_err(|e| self.io_error("cannot replace", e))?;
        info!(path = %self.path.display(), "saved Google tokens");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    fn io_error(&self, action: &str, err: std::io::Error) -> ProviderError {
        ProviderError::configuration(format!(
            "{} token file {}: {}",
            action,
            self.path.display(),
            err
        ))
        .with_source(err)
    }
}
