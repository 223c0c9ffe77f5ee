//! Bucket manager command-line entry point.

mod commands;
mod config;

use std::process::ExitCode;

use bucketmgr_aps::ApsError;
use bucketmgr_derivatives::DerivativeError;
use bucketmgr_protocol::ErrorClass;
use bucketmgr_transfer::TransferError;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = commands::Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bucketmgr=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#} [{}]", error_class(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: commands::Cli) -> anyhow::Result<()> {
    let config = config::Config::load(cli.config.as_deref())?;
    tracing::debug!(region = %config.region(), "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(commands::run(cli, config))
}

/// Classification of the first library error in the chain.
fn error_class(err: &anyhow::Error) -> ErrorClass {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ApsError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<TransferError>() {
            return e.class();
        }
        if let Some(e) = cause.downcast_ref::<DerivativeError>() {
            return e.class();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorClass::Io;
        }
    }
    ErrorClass::Fatal
}
