//! timetable CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use timetable_core::{TracingConfig, init_tracing};

use timetable_client::cli::{AuthProvider, Cli, Command, ConfigAction};
use timetable_client::commands;
use timetable_client::config::AppConfig;
use timetable_client::error::{ClientError, ClientResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = AppConfig::load(cli.config.as_deref());

    // Initialize tracing
    let tracing = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        let format = loaded
            .as_ref()
            .ok()
            .and_then(|config| config.log_format().ok())
            .unwrap_or_default();
        TracingConfig::default().with_format(format)
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    let result = match loaded {
        Ok(mut config) => {
            config.general.dry_run |= cli.dry_run;
            run(cli, config).await
        }
        Err(e) => Err(ClientError::Config(e)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> ClientResult<()> {
    match cli.command.unwrap_or(Command::Run { force: false }) {
        Command::Run { force } => commands::run::run(&config, force).await,
        Command::Download => commands::download::download(&config).await,
        Command::Parse {
            pdf,
            tables,
            output,
        } => commands::parse::parse(&config, &pdf, tables.as_deref(), output.as_deref()).await,
        Command::Version { pdf } => commands::version::version(&pdf),
        #[cfg(feature = "google")]
        Command::Push {
            events,
            calendar_id,
        } => commands::push::push(&config, &events, calendar_id.as_deref()).await,
        Command::Auth { provider } => match provider {
            #[cfg(feature = "google")]
            AuthProvider::Google { force } => commands::auth::google(&config, force).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, cli.config.as_deref()),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(cli.config.as_deref()),
        },
    }
}
