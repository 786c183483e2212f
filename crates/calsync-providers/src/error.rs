//! Failures from the Exchange and Google backends.
//!
//! Everything the providers return is a [`ProviderError`]: a coarse
//! [`ProviderErrorCode`] plus a message that keeps the HTTP status and body
//! when there is one.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials rejected, or a token that can no longer be used.
    AuthenticationFailed,
    /// Valid credentials without access to the resource.
    AuthorizationFailed,
    /// No usable connection: DNS, TLS, refused, timed out.
    NetworkError,
    RateLimited,
    /// 5xx.
    ServerError,
    /// The body could not be understood.
    InvalidResponse,
    NotFound,
    BadRequest,
    ConfigurationError,
    /// An error reported inside an otherwise successful response, such as an
    /// EWS `ResponseClass="Error"`.
    CalendarError,
    InternalError,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::CalendarError => "calendar_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Credential or permission failures.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::AuthorizationFailed)
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// `"exchange"` or `"google"` once the error leaves a provider.
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

macro_rules! constructors {
    ($($name:ident => $code:ident),* $(,)?) => {
        $(
            pub fn $name(message: impl Into<String>) -> Self {
                Self::new(ProviderErrorCode::$code, message)
            }
        )*
    };
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    constructors! {
        authentication => AuthenticationFailed,
        authorization => AuthorizationFailed,
        network => NetworkError,
        rate_limited => RateLimited,
        server => ServerError,
        invalid_response => InvalidResponse,
        not_found => NotFound,
        bad_request => BadRequest,
        configuration => ConfigurationError,
        calendar => CalendarError,
        internal => InternalError,
    }

    /// Classifies a non-success HTTP response. `context` names the call,
    /// e.g. `"events.insert"`.
    pub fn from_status(context: &str, status: StatusCode, body: &str) -> Self {
        let message = format!("{} failed ({}): {}", context, status, body.trim());
        let code = match status {
            StatusCode::UNAUTHORIZED => ProviderErrorCode::AuthenticationFailed,
            // Google reports quota exhaustion as 403 with a reason in the body.
            StatusCode::FORBIDDEN if body.contains("rateLimitExceeded") => {
                ProviderErrorCode::RateLimited
            }
            StatusCode::FORBIDDEN => ProviderErrorCode::AuthorizationFailed,
            StatusCode::NOT_FOUND | StatusCode::GONE => ProviderErrorCode::NotFound,
            StatusCode::TOO_MANY_REQUESTS => ProviderErrorCode::RateLimited,
            StatusCode::BAD_REQUEST => ProviderErrorCode::BadRequest,
            s if s.is_server_error() => ProviderErrorCode::ServerError,
            _ => ProviderErrorCode::InvalidResponse,
        };
        Self::new(code, message)
    }

    /// Wraps a reqwest error that never produced a response.
    pub fn from_transport(context: &str, err: reqwest::Error) -> Self {
        let what = if err.is_timeout() {
            "timed out".to_string()
        } else if err.is_connect() {
            format!("cannot connect: {}", err)
        } else {
            format!("request failed: {}", err)
        };
        Self::network(format!("{}: {}", context, what)).with_source(err)
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "{} ({}): {}", provider, self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
