//! Google Calendar target configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_core::EmailAddress;
use serde::Deserialize;

/// Calendar API base URL.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Suffix every Google OAuth client id carries.
const CLIENT_ID_SUFFIX: &str = ".apps.googleusercontent.com";

/// A desktop OAuth client registered by the user in Google Cloud Console.
#[derive(Clone, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Layouts of the client secret JSON. Console downloads nest the pair under
/// `installed` or `web`; gcloud writes it at the top level.
#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    Installed { installed: OAuthCredentials },
    Web { web: OAuthCredentials },
    Flat(OAuthCredentials),
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads a client secret JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read credentials file {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    /// Parses any of the client secret JSON layouts.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| format!("credentials file is not valid JSON: {}", e))?;
        match serde_json::from_value(value) {
            Ok(CredentialsFile::Installed { installed }) => Ok(installed),
            Ok(CredentialsFile::Web { web }) => Ok(web),
            Ok(CredentialsFile::Flat(flat)) => Ok(flat),
            Err(_) => Err(
                "credentials file has no client_id/client_secret pair \
                 (expected an `installed` or `web` object, or top-level keys)"
                    .to_string(),
            ),
        }
    }

    /// Checks the pair looks like a Google OAuth client.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is empty");
        }
        if !self.client_id.ends_with(CLIENT_ID_SUFFIX) {
            return Err("client_id does not end in .apps.googleusercontent.com");
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is empty");
        }
        Ok(())
    }
}

/// Everything needed to open a session on the target calendar.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Calendar that receives synced events, `primary` or a calendar address.
    pub calendar_id: String,

    pub credentials: OAuthCredentials,

    /// Token file, by default `$XDG_DATA_HOME/calsync/google-tokens.json`.
    pub token_path: PathBuf,

    /// Per-request timeout for API and token calls.
    pub timeout: Duration,

    pub user_agent: String,

    /// Ports tried, in order, for the consent redirect listener.
    pub loopback_ports: (u16, u16),

    /// Scopes requested at consent and required of stored tokens.
    pub scopes: Vec<String>,

    /// Calendar API base URL.
    pub api_base: String,

    /// OAuth token endpoint.
    pub token_url: String,

    /// Address added to created events as an accepted attendee.
    ///
    /// This is usually the owner of the target calendar, so synced events
    /// show up as accepted rather than as invitations.
    pub self_attendee: Option<EmailAddress>,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Scope for reading and writing events.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar.events";

    pub fn new(calendar_id: impl Into<String>, credentials: OAuthCredentials) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            credentials,
            token_path: Self::default_token_path(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calsync/{}", env!("CARGO_PKG_VERSION")),
            loopback_ports: (8080, 8090),
            scopes: vec![Self::DEFAULT_SCOPE.to_owned()],
            api_base: CALENDAR_API_BASE.to_owned(),
            token_url: GOOGLE_TOKEN_URL.to_owned(),
            self_attendee: None,
        }
    }

    pub fn default_token_path() -> PathBuf {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
            .unwrap_or_default();
        data_dir.join("calsync").join("google-tokens.json")
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_loopback_ports(mut self, first: u16, last: u16) -> Self {
        self.loopback_ports = (first, last);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Points the client at a different API and token endpoint.
    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.token_url = token_url.into();
        self
    }

    pub fn with_self_attendee(mut self, email: EmailAddress) -> Self {
        self.self_attendee = Some(email);
        self
    }

    /// Checks the settings without touching the network.
    pub fn validate(&self) -> Result<(), String> {
        if self.calendar_id.trim().is_empty() {
            return Err("Google calendar_id is required".to_string());
        }
        self.credentials
            .validate()
            .map_err(|e| format!("Google OAuth client: {}", e))?;
        if self.scopes.is_empty() {
            return Err("no OAuth scopes configured".to_string());
        }
        let (first, last) = self.loopback_ports;
        if first > last {
            return Err(format!("loopback ports {}-{} are reversed", first, last));
        }
        Ok(())
    }
}
