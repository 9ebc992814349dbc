use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::config::Config;

/// One element of a fan-out. `key` is the input this sub-job docks and is
/// what the checkpoint records once the sub-job succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct SubJob {
    pub key: PathBuf,
    pub config: Config,
}

fn entry_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .with_context(|| format!("Unable to get file name from path {:?}", path))
}

fn create_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Unable to create output directory at {:?}", dir))
}

/// Output file of one batch entry, placed under `dir`.
pub fn batch_output(config: &Config, entry: &Path) -> Result<PathBuf> {
    let dir = config
        .dir
        .as_ref()
        .ok_or_else(|| anyhow!("Batch mode needs an output directory"))?;
    Ok(dir.join(entry_name(entry)?))
}

/// Split a validated config into independent sub-jobs, one per ligand or
/// per batch entry. A config with a single ligand or entry is one job.
pub fn plan(config: &Config) -> Result<Vec<SubJob>> {
    if !config.batch.is_empty() {
        let dir = config
            .dir
            .as_ref()
            .ok_or_else(|| anyhow!("Batch mode needs an output directory"))?;
        create_output_dir(dir)?;
    }

    if config.ligands.len() > 1 {
        let dir = config.ligand_output_dir();
        if let Some(dir) = &dir {
            create_output_dir(dir)?;
        } else if !config.score_only {
            return Err(anyhow!(
                "An output directory is needed to dock {} ligands",
                config.ligands.len()
            ));
        }
        let jobs = config
            .ligands
            .iter()
            .map(|ligand| {
                let mut sub_config = config.clone();
                sub_config.ligands = vec![ligand.clone()];
                if let Some(dir) = &dir {
                    sub_config.out = Some(dir.join(entry_name(ligand)?));
                }
                Ok(SubJob {
                    key: ligand.clone(),
                    config: sub_config,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Docking {} ligands one by one", jobs.len());
        return Ok(jobs);
    }

    if config.batch.len() > 1 {
        let jobs = config
            .batch
            .iter()
            .map(|entry| {
                let mut sub_config = config.clone();
                sub_config.batch = vec![entry.clone()];
                SubJob {
                    key: entry.clone(),
                    config: sub_config,
                }
            })
            .collect::<Vec<_>>();
        info!("Docking {} batch entries one by one", jobs.len());
        return Ok(jobs);
    }

    let key = config
        .ligands
        .first()
        .or_else(|| config.batch.first())
        .cloned()
        .ok_or_else(|| anyhow!("Missing ligand(s)"))?;
    Ok(vec![SubJob {
        key,
        config: config.clone(),
    }])
}
