//! Sync configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/calsync/config.toml` by default.
//!
//! `exchange.password`, `google.client_id` and `google.client_secret` support
//! secret references (see [`crate::secret`]). Relative paths are resolved
//! against the directory holding the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_core::{EmailAddress, SyncWindow};
use calsync_providers::exchange::ExchangeConfig;
use calsync_providers::google::{GoogleConfig, OAuthCredentials};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::filter::EventFilter;
use crate::secret;

// ---------------------------------------------------------------------------
// Config (config.toml)
// ---------------------------------------------------------------------------

/// The contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window and logging settings.
    pub general: GeneralSettings,

    /// Exchange source settings.
    pub exchange: Option<ExchangeSettings>,

    /// Google Calendar target settings.
    pub google: Option<GoogleSettings>,

    /// Which source events are copied.
    pub filters: FilterSettings,

    /// File this configuration was read from.
    #[serde(skip)]
    source: Option<PathBuf>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// Window and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Days before today included in the window. The sign is ignored.
    pub days_past: i64,

    /// Days after today included in the window. The sign is ignored.
    pub days_future: i64,

    /// IANA timezone for the window and all-day dates.
    pub timezone: String,

    /// File logs are appended to, in addition to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            days_past: 7,
            days_future: 14,
            timezone: "UTC".to_string(),
            log_file: None,
        }
    }
}

/// Exchange Web Services connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// EWS endpoint, e.g. `https://mail.example.com/EWS/Exchange.asmx`.
    pub url: Option<String>,

    /// Account name, usually `DOMAIN\user` or a UPN.
    pub username: Option<String>,

    /// Password (supports secret references).
    pub password: Option<String>,

    /// Verify the server certificate.
    pub verify_cert: bool,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            verify_cert: true,
            timeout_secs: ExchangeConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Google Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Calendar synced events are written to.
    pub calendar_id: Option<String>,

    /// Google Cloud Console client secret JSON.
    pub credentials_file: Option<PathBuf>,

    /// OAuth client ID (supports secret references).
    pub client_id: Option<String>,

    /// OAuth client secret (supports secret references).
    pub client_secret: Option<String>,

    /// Path to token storage.
    pub token_path: Option<PathBuf>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Address added to created events as an accepted attendee.
    pub self_email: Option<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            calendar_id: None,
            credentials_file: None,
            client_id: None,
            client_secret: None,
            token_path: None,
            timeout_secs: GoogleConfig::DEFAULT_TIMEOUT_SECS,
            self_email: None,
        }
    }
}

/// Filter settings for source events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// When non-empty, only subjects matching one of these regexes are synced.
    pub include_subjects: Vec<String>,

    /// Subjects matching any of these regexes are skipped.
    pub exclude_subjects: Vec<String>,

    /// Skip all-day events.
    pub skip_all_day: bool,
}

/// Validated settings for one sync run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub days_past: u32,
    pub days_future: u32,
    pub timezone: Tz,
    pub log_file: Option<PathBuf>,
    pub exchange: ExchangeConfig,
    pub google: GoogleConfig,
    pub filter: EventFilter,
}

impl Settings {
    /// Returns the sync window around `now`.
    pub fn window(&self, now: DateTime<Utc>) -> SyncResult<SyncWindow> {
        SyncWindow::around(now, self.timezone, self.days_past, self.days_future).ok_or_else(|| {
            SyncError::Configuration(format!(
                "a window of {} past and {} future days is out of range",
                self.days_past, self.days_future
            ))
        })
    }
}

impl Config {
    /// Loads configuration from `path`, or from the default path.
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SyncError::Configuration(format!(
                "failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut config = Self::from_toml(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.source = Some(path);
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(content: &str) -> SyncResult<Self> {
        toml::from_str(content)
            .map_err(|e| SyncError::Configuration(format!("failed to parse config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
            .join("config.toml")
    }

    /// Returns the log file path, if one is configured.
    pub fn log_file(&self) -> Option<PathBuf> {
        self.general.log_file.as_deref().map(|p| self.resolve_path(p))
    }

    /// Validates every section and resolves secret references.
    ///
    /// No network access happens here.
    pub fn resolve(&self) -> SyncResult<Settings> {
        let days_past = day_count("days_past", self.general.days_past)?;
        let days_future = day_count("days_future", self.general.days_future)?;
        let timezone: Tz = self.general.timezone.parse().map_err(|_| {
            SyncError::Configuration(format!("unknown timezone `{}`", self.general.timezone))
        })?;

        let exchange = self
            .exchange
            .as_ref()
            .ok_or_else(|| self.missing_section("exchange"))?
            .to_provider_config()
            .map_err(SyncError::Configuration)?;

        let google = self
            .google
            .as_ref()
            .ok_or_else(|| self.missing_section("google"))?
            .to_provider_config(|p| self.resolve_path(p))
            .map_err(SyncError::Configuration)?;

        let filter = EventFilter::new(
            &self.filters.include_subjects,
            &self.filters.exclude_subjects,
            self.filters.skip_all_day,
        )
        .map_err(|e| SyncError::Configuration(format!("invalid subject filter: {}", e)))?;

        Ok(Settings {
            days_past,
            days_future,
            timezone,
            log_file: self.log_file(),
            exchange,
            google,
            filter,
        })
    }

    fn missing_section(&self, name: &str) -> SyncError {
        let path = self.source.clone().unwrap_or_else(Self::default_path);
        SyncError::Configuration(format!(
            "[{}] section is missing from {}",
            name,
            path.display()
        ))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// Upper bound for `days_past` and `days_future`, about a century.
const MAX_DAYS: u32 = 36_500;

fn day_count(key: &str, value: i64) -> SyncResult<u32> {
    u32::try_from(value.unsigned_abs())
        .ok()
        .filter(|days| *days <= MAX_DAYS)
        .ok_or_else(|| {
            SyncError::Configuration(format!(
                "general.{} must be at most {} days, got {}",
                key, MAX_DAYS, value
            ))
        })
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("{} is required", key))
}

impl ExchangeSettings {
    /// Converts to provider configuration, resolving the password.
    pub fn to_provider_config(&self) -> Result<ExchangeConfig, String> {
        let url = required(&self.url, "exchange.url")?;
        let username = required(&self.username, "exchange.username")?;
        let raw_password = required(&self.password, "exchange.password")?;
        let password = secret::resolve(raw_password)
            .map_err(|e| format!("failed to resolve exchange.password: {}", e))?;

        let config = ExchangeConfig::new(url, username, password)
            .map_err(|e| format!("invalid exchange.url: {}", e))?
            .with_verify_tls(self.verify_cert)
            .with_timeout(Duration::from_secs(self.timeout_secs));
        config.validate()?;
        Ok(config)
    }
}

impl GoogleSettings {
    /// Converts to provider configuration.
    ///
    /// `resolve_path` maps relative file paths to absolute ones.
    pub fn to_provider_config(
        &self,
        resolve_path: impl Fn(&Path) -> PathBuf,
    ) -> Result<GoogleConfig, String> {
        let calendar_id = required(&self.calendar_id, "google.calendar_id")?;
        let credentials = self.resolve_credentials(&resolve_path)?;
        credentials
            .validate()
            .map_err(|e| format!("invalid Google credentials: {}", e))?;

        let mut config = GoogleConfig::new(calendar_id, credentials)
            .with_timeout(Duration::from_secs(self.timeout_secs));

        if let Some(ref path) = self.token_path {
            config = config.with_token_path(resolve_path(path));
        }

        if let Some(ref email) = self.self_email {
            let email = EmailAddress::parse(email)
                .map_err(|e| format!("invalid google.self_email: {}", e))?;
            config = config.with_self_attendee(email);
        }

        config.validate()?;
        Ok(config)
    }

    /// Resolves OAuth credentials.
    ///
    /// A `credentials_file` takes precedence over inline `client_id` and
    /// `client_secret`, which are passed through [`secret::resolve`].
    fn resolve_credentials(
        &self,
        resolve_path: &impl Fn(&Path) -> PathBuf,
    ) -> Result<OAuthCredentials, String> {
        if let Some(ref path) = self.credentials_file {
            return OAuthCredentials::from_file(resolve_path(path));
        }

        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            "Google credentials not found. Add to [google]:\n  \
             credentials_file = \"client_secret.json\"\n\n  \
             or:\n  \
             client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
             client_secret = \"YOUR_SECRET\""
                .to_string()
        })?;

        let raw_secret = self.client_secret.as_deref().ok_or_else(|| {
            "client_secret is missing from [google] section in config.toml".to_string()
        })?;

        let resolved_id = secret::resolve(raw_id)
            .map_err(|e| format!("failed to resolve client_id: {}", e))?;
        let resolved_secret = secret::resolve(raw_secret)
            .map_err(|e| format!("failed to resolve client_secret: {}", e))?;

        Ok(OAuthCredentials::new(resolved_id, resolved_secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FULL: &str = r#"
[general]
days_past = -3
days_future = 10
timezone = "Europe/Paris"
log_file = "calsync.log"

[exchange]
url = "https://mail.example.com/EWS/Exchange.asmx"
username = "CORP\\jdoe"
password = "base64::c2VjcmV0"
verify_cert = false
timeout_secs = 45

[google]
calendar_id = "work@group.calendar.google.com"
client_id = "toml-id.apps.googleusercontent.com"
client_secret = "toml-secret"
token_path = "tokens.json"
self_email = "Me@Example.com"

[filters]
include_subjects = ["standup"]
exclude_subjects = ["^private"]
skip_all_day = true
"#;

    fn minimal() -> String {
        r#"
[exchange]
url = "https://mail.example.com/EWS/Exchange.asmx"
username = "jdoe"
password = "pw"

[google]
calendar_id = "primary"
client_id = "id.apps.googleusercontent.com"
client_secret = "secret"
"#
        .to_string()
    }

    #[test]
    fn full_config_resolves() {
        let config = Config::from_toml(FULL).unwrap();
        let settings = config.resolve().unwrap();

        assert_eq!(settings.days_past, 3);
        assert_eq!(settings.days_future, 10);
        assert_eq!(settings.timezone, chrono_tz::Europe::Paris);
        assert_eq!(settings.log_file, Some(PathBuf::from("calsync.log")));

        assert_eq!(settings.exchange.username, "CORP\\jdoe");
        assert_eq!(settings.exchange.password, "secret");
        assert!(!settings.exchange.verify_tls);
        assert_eq!(settings.exchange.timeout, Duration::from_secs(45));

        assert_eq!(settings.google.calendar_id, "work@group.calendar.google.com");
        assert_eq!(settings.google.credentials.client_secret, "toml-secret");
        assert_eq!(settings.google.token_path, PathBuf::from("tokens.json"));
        assert_eq!(
            settings.google.self_attendee.as_ref().map(|e| e.as_str()),
            Some("me@example.com")
        );
        assert!(!settings.filter.is_pass_through());
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_toml(&minimal()).unwrap();
        assert_eq!(config.general.days_past, 7);
        assert_eq!(config.general.days_future, 14);

        let settings = config.resolve().unwrap();
        assert_eq!(settings.timezone, Tz::UTC);
        assert!(settings.exchange.verify_tls);
        assert_eq!(
            settings.google.timeout,
            Duration::from_secs(GoogleConfig::DEFAULT_TIMEOUT_SECS)
        );
        assert_eq!(settings.google.token_path, GoogleConfig::default_token_path());
        assert!(settings.google.self_attendee.is_none());
        assert!(settings.filter.is_pass_through());
        assert!(settings.log_file.is_none());
    }

    #[test]
    fn window_uses_configured_days() {
        let settings = Config::from_toml(&minimal()).unwrap().resolve().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        let window = settings.window(now).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 1, 25, 0, 0, 0).unwrap());
    }

    #[test]
    fn missing_sections_error() {
        let err = Config::from_toml("").unwrap().resolve().unwrap_err();
        assert!(err.to_string().contains("[exchange]"));

        let only_exchange = minimal().split("[google]").next().unwrap().to_string();
        let err = Config::from_toml(&only_exchange).unwrap().resolve().unwrap_err();
        assert!(err.to_string().contains("[google]"));
    }

    #[test]
    fn day_counts_are_bounded() {
        let at = |past: i64, future: i64| {
            format!("{}\n[general]\ndays_past = {}\ndays_future = {}\n", minimal(), past, future)
        };

        let settings = Config::from_toml(&at(-36_500, 36_500)).unwrap().resolve().unwrap();
        assert_eq!(settings.days_past, 36_500);
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        assert!(settings.window(now).is_ok());

        for (past, future) in [(200_000_000, 1), (1, 36_501), (i64::MIN, 1)] {
            let err = Config::from_toml(&at(past, future)).unwrap().resolve().unwrap_err();
            assert!(matches!(err, SyncError::Configuration(_)), "{} {}", past, future);
            assert!(err.to_string().contains("at most 36500 days"));
        }
    }

    #[test]
    fn missing_section_names_loaded_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("work.toml");
        std::fs::write(&path, "[general]\ndays_past = 1\n").unwrap();

        let err = Config::load(Some(&path)).unwrap().resolve().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("[exchange]"));
        assert!(message.contains(&path.display().to_string()), "{}", message);

        let err = Config::from_toml("").unwrap().resolve().unwrap_err();
        assert!(err.to_string().contains(&Config::default_path().display().to_string()));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let cases = [
            minimal().replace("pw", ""),
            minimal().replace("https://mail.example.com/EWS/Exchange.asmx", "not a url"),
            minimal().replace("calendar_id = \"primary\"", "calendar_id = \" \""),
            minimal().replace("id.apps.googleusercontent.com", "bad-id"),
            format!("{}\n[general]\ntimezone = \"Mars/Olympus\"\n", minimal()),
            format!("{}\n[filters]\ninclude_subjects = [\"(\"]\n", minimal()),
            minimal().replace(
                "client_secret = \"secret\"",
                "client_secret = \"secret\"\nself_email = \"nobody\"",
            ),
        ];

        for case in cases {
            let err = Config::from_toml(&case).unwrap().resolve().unwrap_err();
            assert!(matches!(err, SyncError::Configuration(_)), "{}", case);
            assert_eq!(err.exit_code(), 2);
        }
    }

    #[test]
    fn malformed_toml_errors() {
        let err = Config::from_toml("[general\n").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("client_secret.json"),
            r#"{"installed": {"client_id": "f.apps.googleusercontent.com", "client_secret": "s"}}"#,
        )
        .unwrap();

        let content = minimal()
            .replace(
                "client_id = \"id.apps.googleusercontent.com\"",
                "credentials_file = \"client_secret.json\"\ntoken_path = \"state/tokens.json\"",
            )
            .replace("client_secret = \"secret\"", "")
            + "\n[general]\nlog_file = \"sync.log\"\n";
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();

        let settings = Config::load(Some(&path)).unwrap().resolve().unwrap();
        assert_eq!(
            settings.google.credentials.client_id,
            "f.apps.googleusercontent.com"
        );
        assert_eq!(
            settings.google.token_path,
            dir.path().join("state").join("tokens.json")
        );
        assert_eq!(settings.log_file, Some(dir.path().join("sync.log")));
    }

    #[test]
    fn credentials_with_env_references() {
        unsafe {
            std::env::set_var("_CALSYNC_TOML_ID", "env-id.apps.googleusercontent.com");
            std::env::set_var("_CALSYNC_TOML_SECRET", "env-secret");
        }

        let content = minimal()
            .replace("\"id.apps.googleusercontent.com\"", "\"env::_CALSYNC_TOML_ID\"")
            .replace("\"secret\"", "\"env::_CALSYNC_TOML_SECRET\"");
        let settings = Config::from_toml(&content).unwrap().resolve().unwrap();
        assert_eq!(
            settings.google.credentials.client_id,
            "env-id.apps.googleusercontent.com"
        );
        assert_eq!(settings.google.credentials.client_secret, "env-secret");

        unsafe {
            std::env::remove_var("_CALSYNC_TOML_ID");
            std::env::remove_var("_CALSYNC_TOML_SECRET");
        }
    }

    #[test]
    fn missing_client_secret_errors() {
        let content = minimal().replace("client_secret = \"secret\"", "");
        let err = Config::from_toml(&content).unwrap().resolve().unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }
}
