//! Completed sub-jobs of a batch, one input path per line, kept next to the
//! config file as `<config-stem>.checkpoint`. Paths under the working
//! directory are written relative to it.

use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{config::working_directory_of, error::CheckpointError};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointStore {
    path: PathBuf,
    base: PathBuf,
}

impl CheckpointStore {
    /// Keys are recorded relative to the directory holding `path`.
    pub fn new(path: PathBuf) -> Self {
        let base = working_directory_of(&path);
        Self { path, base }
    }

    pub fn for_config(config_file: &Path) -> Self {
        let stem = config_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "config".to_string());
        Self::new(config_file.with_file_name(format!("{}.checkpoint", stem)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A checkpoint file on disk means an interrupted batch is resumed.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn completed(&self) -> Result<HashSet<PathBuf>, CheckpointError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        BufReader::new(file)
            .lines()
            .filter(|line| !matches!(line, Ok(line) if line.is_empty()))
            .map(|line| {
                line.map(|line| self.base.join(line))
                    .map_err(|source| CheckpointError::Read {
                        path: self.path.clone(),
                        source,
                    })
            })
            .collect()
    }

    pub fn record(&self, key: &Path) -> Result<(), CheckpointError> {
        let append_error = |source| CheckpointError::Append {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(append_error)?;
        let key = key.strip_prefix(&self.base).unwrap_or(key);
        writeln!(file, "{}", key.to_string_lossy()).map_err(append_error)?;
        file.sync_data().map_err(append_error)?;
        debug!("Checkpoint {:?} records {:?}", self.path, key);
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
