//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// timetable - university timetable PDFs to calendar events
#[derive(Debug, Parser)]
#[command(name = "timetable")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "TIMETABLE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log what would happen without storing versions or touching calendars
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download new versions, reconstruct their events and sync calendars
    /// (the default)
    Run {
        /// Reprocess the latest stored version even if nothing new was found
        #[arg(long, short)]
        force: bool,
    },

    /// Only download and store new versions
    Download,

    /// Reconstruct the events of a local PDF
    Parse {
        /// The timetable PDF
        pdf: PathBuf,

        /// Read tables from a directory of CSV files instead of running the
        /// extractor
        #[arg(long)]
        tables: Option<PathBuf>,

        /// Output directory (defaults to [paths] output_dir)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the version stamp of a local PDF
    Version {
        pdf: PathBuf,
    },

    /// Sync a previously written events JSON file to Google Calendar
    #[cfg(feature = "google")]
    Push {
        /// An `*_events.json` file
        events: PathBuf,

        /// Calendar to replace (defaults to [google_calendar] calendar_id)
        #[arg(long)]
        calendar_id: Option<String>,
    },

    /// Authentication commands
    Auth {
        #[command(subcommand)]
        provider: AuthProvider,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Authentication providers.
#[derive(Debug, Subcommand)]
pub enum AuthProvider {
    /// Authenticate with Google Calendar
    #[cfg(feature = "google")]
    Google {
        /// Force re-authentication even if already authenticated
        #[arg(long, short)]
        force: bool,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["timetable", "--dry-run"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.command.is_none());
    }

    #[test]
    fn parse_with_tables_dir() {
        let cli = Cli::try_parse_from([
            "timetable",
            "parse",
            "plan.pdf",
            "--tables",
            "tables/",
            "-v",
        ])
        .unwrap();
        assert!(cli.debug);
        match cli.command {
            Some(Command::Parse { pdf, tables, output }) => {
                assert_eq!(pdf, PathBuf::from("plan.pdf"));
                assert_eq!(tables, Some(PathBuf::from("tables/")));
                assert_eq!(output, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_force() {
        let cli = Cli::try_parse_from(["timetable", "run", "--force"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Run { force: true })));
    }
}
