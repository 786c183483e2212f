//! Exchange provider configuration.

use std::time::Duration;
use url::Url;

/// Configuration for the Exchange Web Services source.
#[derive(Clone)]
pub struct ExchangeConfig {
    /// The EWS endpoint, usually `https://host/EWS/Exchange.asmx`.
    pub url: Url,

    /// Username for authentication, e.g. `DOMAIN\user` or `user@example.com`.
    pub username: String,

    /// Password for authentication.
    pub password: String,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Request timeout.
    pub timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Maximum items per FindItem page.
    pub page_size: usize,

    /// Maximum item ids per GetItem request.
    pub batch_size: usize,
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("url", &self.url.as_str())
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExchangeConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Default FindItem page size.
    pub const DEFAULT_PAGE_SIZE: usize = 200;

    /// Default GetItem batch size.
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    /// Creates a new Exchange configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(
        url: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url.as_ref())?;
        Ok(Self {
            url: parsed,
            username: username.into(),
            password: password.into(),
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calsync/{}", env!("CARGO_PKG_VERSION")),
            page_size: Self::DEFAULT_PAGE_SIZE,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        })
    }

    /// Disables TLS verification.
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Sets whether TLS certificates are verified.
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the FindItem page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the GetItem batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Returns the endpoint URL as a string.
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err("Exchange URL must use http or https");
        }
        if self.username.is_empty() {
            return Err("Exchange username is required");
        }
        if self.password.is_empty() {
            return Err("Exchange password is required");
        }
        Ok(())
    }
}
