//! Command-line entry point for calsync.
//!
//! Loads the configuration, opens the Exchange source and the Google target,
//! and runs one sync pass between them.

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod secret;
pub mod sync;

use calsync_providers::exchange::ExchangeCalendar;
use calsync_providers::google::GoogleCalendar;
use chrono::Utc;

pub use cli::Cli;
pub use config::{Config, Settings};
pub use error::{SyncError, SyncResult};
pub use filter::EventFilter;
pub use sync::{SyncReport, run_sync};

/// Runs one pass with the given configuration.
///
/// Everything is validated before the first request. The Google session may
/// open a browser for consent when no usable token is stored.
pub async fn run(cli: &Cli, config: &Config) -> SyncResult<SyncReport> {
    let settings = config.resolve()?;
    let window = settings.window(Utc::now())?;

    let source = ExchangeCalendar::new(settings.exchange).map_err(SyncError::from_connect)?;
    let target = GoogleCalendar::connect(settings.google)
        .await
        .map_err(SyncError::from_connect)?;

    run_sync(&source, &target, &window, &settings.filter, cli.dry_run).await
}
