use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use boinc_autodock_vina::{runner::run_job, vina_cli::VinaCommand};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vina_job::{archive, env::set_path, Config};

/// Dock ligands with AutoDock Vina, resuming from the checkpoint of an
/// interrupted run.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Job description (config.json) or a work unit archive (.zip).
    ///
    /// Relative paths in the job description are resolved against its
    /// directory.
    input: PathBuf,
    /// Directory a work unit archive is unpacked into, defaults to a
    /// directory named after the archive next to it.
    #[arg(short = 'w', long)]
    work_dir: Option<PathBuf>,
    /// Pack the job outputs into this archive once docking succeeded.
    #[arg(short = 'r', long)]
    result: Option<PathBuf>,
    /// AutoDock Vina executable.
    #[arg(long, default_value = "vina")]
    vina: PathBuf,
    /// Directories searched for executables before PATH.
    #[arg(long = "bin-dir")]
    bin_dirs: Vec<PathBuf>,
}

fn is_work_unit(input: &Path) -> bool {
    input
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("zip"))
}

fn config_file(args: &Args) -> Result<PathBuf> {
    if !is_work_unit(&args.input) {
        return Ok(args.input.clone());
    }
    let work_dir = args
        .work_dir
        .clone()
        .unwrap_or_else(|| args.input.with_extension(""));
    let files = archive::extract(&args.input, &work_dir)
        .with_context(|| format!("Unable to unpack work unit {:?}", args.input))?;
    info!("Unpacked {} files into {:?}", files.len(), work_dir);
    Ok(work_dir.join(archive::CONFIG_ENTRY))
}

fn run(args: Args) -> Result<()> {
    set_path(&args.bin_dirs)?;
    let config_file = config_file(&args)?;
    let report = run_job(&config_file, VinaCommand::new(&args.vina), |fraction| {
        info!("Progress {:.1}%", fraction * 100.)
    })?;
    info!(
        "{} of {} sub-jobs docked in this run",
        report.docked, report.sub_jobs
    );
    if let Some(result) = &args.result {
        let config = Config::load(&config_file)?;
        archive::create_result_archive(&config, result)
            .with_context(|| format!("Unable to write result archive {:?}", result))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
