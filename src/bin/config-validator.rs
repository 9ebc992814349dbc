use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use vina_job::Config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Check that a job description loads and that every file it names exists.
struct Arguments {
    config: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let arg = Arguments::parse();
    let config = match Config::load(&arg.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Config load failed: {}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = config.validate() {
        error!("Config validation failed: {}", err);
        return ExitCode::FAILURE;
    }
    println!("Validation passed");
    ExitCode::SUCCESS
}
