//! Work units are flat zip archives: `config.json` next to every input file,
//! stored by file name only.

use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tracing::{info, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{config::Config, error::ArchiveError, schema::SchemaFlavor};

pub const CONFIG_ENTRY: &str = "config.json";

fn io_error(path: &Path) -> impl Fn(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn zip_error(path: &Path) -> impl Fn(zip::result::ZipError) -> ArchiveError + '_ {
    move |source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    }
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Archive file names must be unique once directories are dropped.
struct FlatWriter<'a> {
    archive: &'a Path,
    writer: ZipWriter<File>,
    names: HashSet<String>,
}

impl<'a> FlatWriter<'a> {
    fn create(archive: &'a Path) -> Result<Self, ArchiveError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(archive)
            .map_err(|source| {
                if source.kind() == ErrorKind::AlreadyExists {
                    ArchiveError::AlreadyExists(archive.to_path_buf())
                } else {
                    io_error(archive)(source)
                }
            })?;
        Ok(Self {
            archive,
            writer: ZipWriter::new(file),
            names: HashSet::new(),
        })
    }

    fn start(&mut self, name: String) -> Result<(), ArchiveError> {
        if !self.names.insert(name.clone()) {
            return Err(ArchiveError::DuplicateEntry(name));
        }
        self.writer
            .start_file(name, options())
            .map_err(zip_error(self.archive))
    }

    fn add_file(&mut self, file: &Path) -> Result<(), ArchiveError> {
        let name = file
            .file_name()
            .ok_or_else(|| ArchiveError::NoFileName(file.to_path_buf()))?
            .to_string_lossy()
            .to_string();
        self.start(name)?;
        let mut source = File::open(file).map_err(io_error(file))?;
        io::copy(&mut source, &mut self.writer).map_err(io_error(file))?;
        Ok(())
    }

    fn finish(self) -> Result<(), ArchiveError> {
        self.writer.finish().map_err(zip_error(self.archive))?;
        Ok(())
    }
}

/// Run `fill` against a fresh archive, removing the half written archive if
/// anything fails.
fn build<F>(archive: &Path, fill: F) -> Result<(), ArchiveError>
where
    F: FnOnce(&mut FlatWriter) -> Result<(), ArchiveError>,
{
    let mut writer = FlatWriter::create(archive)?;
    let result = fill(&mut writer).and_then(|_| writer.finish());
    if result.is_err() {
        if let Err(err) = std::fs::remove_file(archive) {
            warn!("Unable to remove incomplete archive {:?}: {}", archive, err);
        }
    }
    result
}

/// Package a job: the config saved with file names only, plus every file
/// returned by `Config::get_files`.
pub fn create_work_unit(
    config: &Config,
    archive: &Path,
    flavor: SchemaFlavor,
) -> Result<(), ArchiveError> {
    build(archive, |writer| {
        writer.start(CONFIG_ENTRY.to_string())?;
        config.to_writer(&mut writer.writer, flavor)?;
        for file in config.get_files() {
            writer.add_file(&file)?;
        }
        Ok(())
    })?;
    info!("Work unit {:?} created", archive);
    Ok(())
}

/// Package arbitrary files by name, used for result archives.
pub fn create_archive(archive: &Path, files: &[PathBuf]) -> Result<(), ArchiveError> {
    build(archive, |writer| {
        for file in files.iter().filter(|file| file.is_file()) {
            writer.add_file(file)?;
        }
        Ok(())
    })?;
    info!("Archive {:?} created with {} files", archive, files.len());
    Ok(())
}

pub fn create_result_archive(config: &Config, archive: &Path) -> Result<(), ArchiveError> {
    let files = config.get_out_files().map_err(ArchiveError::Outputs)?;
    create_archive(archive, &files)
}

/// Unpack every file entry into `target`, dropping directory components so
/// nothing is written outside of it.
pub fn extract(archive: &Path, target: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive).map_err(io_error(archive))?;
    let mut zip = ZipArchive::new(file).map_err(zip_error(archive))?;
    std::fs::create_dir_all(target).map_err(io_error(target))?;
    let mut extracted = vec![];
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_error(archive))?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry
            .enclosed_name()
            .and_then(|path| path.file_name().map(|name| name.to_os_string()))
        else {
            warn!("Skip archive entry {:?} with unusable name", entry.name());
            continue;
        };
        let path = target.join(name);
        let mut output = File::create(&path).map_err(io_error(&path))?;
        io::copy(&mut entry, &mut output).map_err(io_error(&path))?;
        extracted.push(path);
    }
    Ok(extracted)
}
