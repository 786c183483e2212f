//! Error types for a sync run.

use std::process::ExitCode;

use calsync_providers::ProviderError;
use thiserror::Error;

/// Why a sync run stopped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configuration is missing, unreadable, or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credentials were rejected or consent could not be obtained.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// A calendar request failed during the pass.
    #[error("remote API error: {0}")]
    RemoteApi(#[from] ProviderError),
}

impl SyncError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Authentication(_) => 3,
            Self::RemoteApi(_) => 4,
        }
    }

    /// Classifies an error raised while opening a calendar session.
    ///
    /// Credential failures become [`SyncError::Authentication`], bad settings
    /// become [`SyncError::Configuration`], the rest stay remote errors.
    pub fn from_connect(err: ProviderError) -> Self {
        let code = err.code();
        if code.is_auth() {
            Self::Authentication(err.to_string())
        } else if code == calsync_providers::ProviderErrorCode::ConfigurationError {
            Self::Configuration(err.to_string())
        } else {
            Self::RemoteApi(err)
        }
    }
}

impl From<&SyncError> for ExitCode {
    fn from(err: &SyncError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

/// Result type for sync runs.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(SyncError::Configuration("x".into()).exit_code(), 2);
        assert_eq!(SyncError::Authentication("x".into()).exit_code(), 3);
        assert_eq!(
            SyncError::RemoteApi(ProviderError::server("boom")).exit_code(),
            4
        );
    }

    #[test]
    fn connect_errors_are_classified() {
        let err = SyncError::from_connect(ProviderError::authentication("token revoked"));
        assert!(matches!(err, SyncError::Authentication(_)));

        let err = SyncError::from_connect(ProviderError::authorization("forbidden"));
        assert!(matches!(err, SyncError::Authentication(_)));

        let err = SyncError::from_connect(ProviderError::configuration("bad client_id"));
        assert!(matches!(err, SyncError::Configuration(_)));

        let err = SyncError::from_connect(ProviderError::network("refused"));
        assert!(matches!(err, SyncError::RemoteApi(_)));
    }

    #[test]
    fn provider_errors_convert_to_remote() {
        let err: SyncError = ProviderError::not_found("gone").into();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().starts_with("remote API error"));
    }
}
