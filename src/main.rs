#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names
)]

use anyhow::Result;
use clap::Parser;
use phasegate::EngineError;
use phasegate::config::Config;
use phasegate::report::exit_codes;
use tracing_subscriber::FmtSubscriber;

mod app;
mod cli;

use cli::commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let err = EngineError::from(e);
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    };

    // Logs go to stderr; stdout carries summaries, reports and blobs.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {e}");
    }

    let code = run(cli, config).await.unwrap_or_else(|e| {
        eprintln!("error: {e:#}");
        exit_code_for(&e)
    });
    std::process::exit(code);
}

async fn run(cli: Cli, config: Config) -> Result<i32> {
    app::dispatch::dispatch(cli, config).await
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<EngineError>()
        .map_or(exit_codes::PARTIAL, EngineError::exit_code)
}
