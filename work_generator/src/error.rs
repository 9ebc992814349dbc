use std::{io, path::PathBuf};

use thiserror::Error;
use vina_job::error::ConfigError;

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Malformed {directive} directive: {source}")]
    Json {
        directive: &'static str,
        source: serde_json::Error,
    },
    #[error("Wrong repair value: [{0}]")]
    UnknownRepair(String),
    #[error("Wrong cleanup value: [{0}]")]
    UnknownCleanup(String),
    #[error("File {0:?} does not exist or is not a regular file")]
    MissingFile(PathBuf),
    #[error("Got {smarts} rigidity bond SMARTS but {indices} index pairs, they must match")]
    RigidityMismatch { smarts: usize, indices: usize },
    #[error("Failed to start {tool}: {source}")]
    ToolStart { tool: String, source: io::Error },
    #[error("{tool} failed with {status}")]
    ToolFailed { tool: String, status: String },
    #[error("{tool} finished without writing {output:?}")]
    MissingOutput { tool: String, output: PathBuf },
    #[error("Unable to create {path:?}: {source}")]
    Staging { path: PathBuf, source: io::Error },
    #[error("Unable to list prepared ligands in {0:?}")]
    Listing(PathBuf),
}
