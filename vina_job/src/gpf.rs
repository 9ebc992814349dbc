//! Grid parameter files (`.gpf`) list every map file a set of precomputed
//! grid maps is made of.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::error::GpfError;

const MAP_KEYWORDS: [&str; 4] = ["map", "gridfld", "elecmap", "dsolvmap"];

/// The grid parameter file sits next to the maps with a `.gpf` extension.
pub fn gpf_filename(maps: &Path) -> PathBuf {
    maps.with_extension("gpf")
}

/// Collect the files referenced by `map`, `gridfld`, `elecmap` and
/// `dsolvmap` lines, resolved against the directory of the gpf file.
///
/// Lines with fewer than two tokens and unknown keywords are skipped.
pub fn files_from_gpf(gpf: &Path) -> Result<Vec<PathBuf>, GpfError> {
    if !gpf.is_file() {
        return Err(GpfError::NotAFile(gpf.to_path_buf()));
    }
    let file = File::open(gpf).map_err(|source| GpfError::Read {
        path: gpf.to_path_buf(),
        source,
    })?;
    let directory = gpf.parent().unwrap_or_else(|| Path::new(""));
    let mut files = vec![];
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|source| GpfError::Read {
            path: gpf.to_path_buf(),
            source,
        })?;
        let mut tokens = line.split_whitespace();
        if let (Some(keyword), Some(value)) = (tokens.next(), tokens.next()) {
            if MAP_KEYWORDS.contains(&keyword) {
                files.push(directory.join(value));
            }
        }
    }
    Ok(files)
}
