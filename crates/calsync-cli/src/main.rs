//! calsync CLI entry point.

use std::process::ExitCode;

use calsync_cli::{Cli, Config, run};
use calsync_core::{TracingConfig, init_tracing};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    let mut tracing = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    if let Some(path) = config.as_ref().ok().and_then(Config::log_file) {
        tracing = tracing.with_log_file(path);
    }
    let _guard = match init_tracing(tracing) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    let result = match config {
        Ok(config) => run(&cli, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(&e)
        }
    }
}
