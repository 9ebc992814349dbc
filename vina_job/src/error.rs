use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error happened while opening {0:?}, it is not a regular file")]
    NotAFile(PathBuf),
    #[error("Unable to read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Unable to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Malformed JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Malformed job description: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("Config should not contain absolute paths, {field} is {value:?}")]
    AbsolutePath { field: &'static str, value: PathBuf },
    #[error("Wrong scoring function: [{0}]")]
    UnknownScoring(String),
    #[error("Only one receptor is allowed per config, {0} given")]
    MultipleReceptors(usize),
}

/// Diagnostics of `Config::validate`, one per rule. Validation stops at the first one.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Cannot specify both receptor and maps at the same time, flex is allowed with either of them")]
    ReceptorAndMaps,
    #[error("The receptor or maps must be specified")]
    MissingReceptorOrMaps,
    #[error("No receptor allowed with the AD4 scoring function, only flex")]
    ReceptorWithAd4,
    #[error("The maps are missing, AD4 scoring function requires them")]
    MissingMapsForAd4,
    #[error("Missing ligand(s)")]
    MissingLigands,
    #[error("Can't use both ligands and batch parameters simultaneously")]
    LigandsAndBatch,
    #[error("Need to specify an output directory for batch mode")]
    MissingBatchDir,
    #[error("Output out (or dir) must be defined when docking multiple ligands")]
    MissingOut,
    #[error("File {0:?} does not exist or is not a regular file")]
    MissingFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum GpfError {
    #[error("Grid parameter file {0:?} does not exist or is not a regular file")]
    NotAFile(PathBuf),
    #[error("Unable to read grid parameter file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive {0:?} already exists")]
    AlreadyExists(PathBuf),
    #[error("Two files share the archive entry name {0:?}")]
    DuplicateEntry(String),
    #[error("Path {0:?} has no file name")]
    NoFileName(PathBuf),
    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Archive error on {path:?}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    #[error("Unable to collect output files: {0:#}")]
    Outputs(anyhow::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Unable to read checkpoint {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Unable to append to checkpoint {path:?}: {source}")]
    Append { path: PathBuf, source: io::Error },
    #[error("Unable to remove checkpoint {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}
