//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// calsync - one-way sync from Exchange to Google Calendar
#[derive(Debug, Parser)]
#[command(name = "calsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Compute and log the changes without writing to Google Calendar
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from(["calsync", "--debug", "--dry-run", "-c", "/tmp/c.toml"])
            .unwrap();
        assert!(cli.debug);
        assert!(cli.dry_run);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn rejects_subcommands() {
        assert!(Cli::try_parse_from(["calsync", "sync"]).is_err());
    }
}
