use crate::{
    conn::{ConnectionPinger, PostgresConnectionPinger},
    error::CliError,
    runner::RunOptions,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use sink_core::{
    config::{SinkKind, SinksConfig},
    env::EnvManager,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod conn;
mod error;
mod runner;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "credsink",
    version = "0.1.0",
    about = "Dispatch delimited records to console, log, file and database sinks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    // Initialize logger; records on stdout stay separate from logs on stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());

    let result = execute(cli.command, &shutdown).await;
    match &result {
        Err(CliError::ShutdownRequested) => info!("All sinks closed after shutdown request"),
        Err(err) => error!(error = %err, "credsink failed"),
        Ok(()) => {}
    }

    let code = ExitCode::from_outcome(&result, shutdown.is_shutdown_requested());
    std::process::exit(code.as_i32());
}

async fn execute(command: Commands, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    match command {
        Commands::Run {
            config,
            input,
            delimiter,
            env_file,
            producers,
        } => {
            let delimiter = u8::try_from(delimiter)
                .ok()
                .filter(u8::is_ascii)
                .ok_or_else(|| {
                    CliError::InvalidArgument(format!("delimiter '{delimiter}' is not ASCII"))
                })?;
            if producers == 0 {
                return Err(CliError::InvalidArgument("producers must be at least 1".into()));
            }

            let config = load_config(&config, env_file.as_deref())?;
            let sinks = config.build().await?;
            shutdown.register_handlers();

            let reader = open_input(input).await?;
            let summary = runner::run(
                sinks,
                reader,
                RunOptions {
                    delimiter,
                    producers,
                },
                shutdown.cancel_token(),
            )
            .await?;

            if summary.cancelled {
                return Err(CliError::ShutdownRequested);
            }
        }
        Commands::Check { config, env_file } => {
            let config = load_config(&config, env_file.as_deref())?;
            for (index, sink) in config.sinks.iter().enumerate() {
                let name = sink.display_name(index);
                match &sink.kind {
                    SinkKind::Postgres(pg) => {
                        let insert = pg.prepared_insert(&name)?;
                        println!("{name} ({}): {}", sink.type_name(), insert.sql());
                    }
                    _ => println!("{name} ({})", sink.type_name()),
                }
            }
            info!(sinks = config.sinks.len(), "Configuration is valid");
        }
        Commands::Ping { config, env_file } => {
            let config = load_config(&config, env_file.as_deref())?;
            let mut pinged = 0;
            for (index, sink) in config.sinks.iter().enumerate() {
                if let SinkKind::Postgres(pg) = &sink.kind {
                    PostgresConnectionPinger {
                        sink: sink.display_name(index),
                        options: pg.connection.clone(),
                    }
                    .ping()
                    .await?;
                    pinged += 1;
                }
            }
            if pinged == 0 {
                info!("No database sinks configured, nothing to ping");
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path, env_file: Option<&Path>) -> Result<SinksConfig, CliError> {
    let mut env = EnvManager::new();
    if let Some(env_file) = env_file {
        env.load_from_file(env_file)?;
    }
    info!("Loading sink config: {}", path.display());
    Ok(SinksConfig::load(path, &env)?)
}

async fn open_input(
    input: Option<PathBuf>,
) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, CliError> {
    match input {
        Some(path) => {
            let file = tokio::fs::File::open(&path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}
