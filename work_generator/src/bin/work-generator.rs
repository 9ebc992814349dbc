use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use glob::glob;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vina_job::{env::set_path, SchemaFlavor};
use work_generator::{
    generator::DEFAULT_PREFIX,
    tools::{ExternalTool, Toolbox},
    WorkGenerator,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
/// Package docking jobs into work units, preparing receptors and ligands on the way.
struct Arguments {
    /// Give the global file match pattern of job documents, for example:
    ///
    /// - "./*.json" matches all json files in current working directory
    ///
    /// - "./jobs/**/*.json" matches all json files found recursively under jobs
    #[arg(short, long)]
    input: String,
    /// Directory the work unit archives are written to.
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
    /// Archive names are `<prefix><n>.zip`.
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,
    /// Write packaged configs as one flat object instead of sections.
    #[arg(long)]
    flat: bool,
    #[arg(long, default_value = "prepare_receptor")]
    prepare_receptor: PathBuf,
    #[arg(long, default_value = "mk_prepare_ligand.py")]
    prepare_ligand: PathBuf,
    #[arg(long, default_value = "obabel")]
    obabel: PathBuf,
    /// Directories searched for executables before PATH.
    #[arg(long = "bin-dir")]
    bin_dirs: Vec<PathBuf>,
}

fn run(arguments: Arguments) -> Result<()> {
    set_path(&arguments.bin_dirs)?;
    std::fs::create_dir_all(&arguments.out_dir)
        .with_context(|| format!("Unable to create output directory {:?}", arguments.out_dir))?;
    let toolbox = Toolbox {
        prepare_receptor: ExternalTool::new(arguments.prepare_receptor),
        prepare_ligand: ExternalTool::new(arguments.prepare_ligand),
        obabel: ExternalTool::new(arguments.obabel),
    };
    let flavor = if arguments.flat {
        SchemaFlavor::Flat
    } else {
        SchemaFlavor::Nested
    };
    let mut generator = WorkGenerator::new(toolbox)
        .with_prefix(arguments.prefix)
        .with_flavor(flavor);
    let matched_paths = glob(&arguments.input)
        .with_context(|| format!("Invalid file pattern {:?}", arguments.input))?;
    let mut failed = 0;
    for path in matched_paths {
        let path = path?;
        info!("Handling file {:?}", path);
        match generator.process(&path, &arguments.out_dir) {
            Ok(archives) => info!("{} work units created from {:?}", archives.len(), path),
            Err(err) => {
                error!("Unable to process {:?}: {:#}", path, err);
                failed += 1;
            }
        }
    }
    anyhow::ensure!(failed == 0, "{} job documents failed", failed);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    match run(Arguments::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
