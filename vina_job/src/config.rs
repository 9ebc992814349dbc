use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use nalgebra::Vector3;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{ConfigError, ValidationError},
    gpf::{files_from_gpf, gpf_filename},
    schema::{
        AdvancedSection, InputSection, MiscSection, OneOrMany, OutputSection, SchemaFlavor,
        SearchAreaSection, Sections,
    },
    scoring::{Scoring, Weights},
};

pub const DEFAULT_OUT: &str = "result.pdbqt";

/// One docking job. Paths are resolved against the directory of the
/// config file they were loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub receptor: Option<PathBuf>,
    pub flex: Option<PathBuf>,
    pub ligands: Vec<PathBuf>,
    pub batch: Vec<PathBuf>,
    pub scoring: Scoring,

    pub maps: Option<PathBuf>,
    pub center_x: f64,
    pub center_y: f64,
    pub center_z: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
    pub autobox: bool,

    pub out: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub write_maps: Option<PathBuf>,

    pub score_only: bool,
    pub local_only: bool,
    pub no_refine: bool,
    pub force_even_voxels: bool,
    pub randomize_only: bool,
    pub weights: Weights,

    pub cpu: i64,
    pub seed: i64,
    pub exhaustiveness: i64,
    pub max_evals: i64,
    pub num_modes: i64,
    pub min_rmsd: f64,
    pub energy_range: f64,
    pub spacing: f64,
    pub verbosity: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receptor: None,
            flex: None,
            ligands: vec![],
            batch: vec![],
            scoring: Scoring::default(),
            maps: None,
            center_x: 0.,
            center_y: 0.,
            center_z: 0.,
            size_x: 0.,
            size_y: 0.,
            size_z: 0.,
            autobox: false,
            out: None,
            dir: None,
            write_maps: None,
            score_only: false,
            local_only: false,
            no_refine: false,
            force_even_voxels: false,
            randomize_only: false,
            weights: Weights::default(),
            cpu: 0,
            seed: 0,
            exhaustiveness: 8,
            max_evals: 0,
            num_modes: 9,
            min_rmsd: 1.0,
            energy_range: 3.0,
            spacing: 0.375,
            verbosity: 1,
        }
    }
}

/// Resolve a relative path from a job document against its working
/// directory. Absolute paths are rejected.
pub fn resolve(
    field: &'static str,
    value: String,
    working_directory: &Path,
) -> Result<PathBuf, ConfigError> {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        return Err(ConfigError::AbsolutePath { field, value: path });
    }
    Ok(working_directory.join(path))
}

fn resolve_optional(
    field: &'static str,
    value: Option<String>,
    working_directory: &Path,
) -> Result<Option<PathBuf>, ConfigError> {
    value
        .map(|value| resolve(field, value, working_directory))
        .transpose()
}

pub fn resolve_all(
    field: &'static str,
    values: Option<OneOrMany>,
    working_directory: &Path,
) -> Result<Vec<PathBuf>, ConfigError> {
    values
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|value| resolve(field, value, working_directory))
        .collect()
}

/// Only the file name is kept when saving, so a saved config sits next to
/// its inputs in one flat directory.
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Directory a config file's relative paths are resolved against.
pub fn working_directory_of(config_file: &Path) -> PathBuf {
    match config_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_file: P) -> Result<Self, ConfigError> {
        let config_file = config_file.as_ref();
        if !config_file.is_file() {
            return Err(ConfigError::NotAFile(config_file.to_path_buf()));
        }
        let file = File::open(config_file).map_err(|source| ConfigError::Read {
            path: config_file.to_path_buf(),
            source,
        })?;
        let document: Value =
            serde_json::from_reader(file).map_err(|source| ConfigError::Json {
                path: config_file.to_path_buf(),
                source,
            })?;
        let config = Self::from_json(&document, &working_directory_of(config_file))?;
        debug!("Loaded config {:?}", config_file);
        Ok(config)
    }

    /// Populate a config from either schema flavour. Fields absent from the
    /// document keep their defaults.
    pub fn from_json(document: &Value, working_directory: &Path) -> Result<Self, ConfigError> {
        let (sections, flavor) = Sections::from_value(document)?;
        let Sections {
            input,
            search_area,
            output,
            advanced,
            misc,
        } = sections;
        let mut config = Self::default();

        let receptors = resolve_all("receptor", input.receptor, working_directory)?;
        if receptors.len() > 1 {
            return Err(ConfigError::MultipleReceptors(receptors.len()));
        }
        config.receptor = receptors.into_iter().next();
        config.flex = resolve_optional("flex", input.flex, working_directory)?;
        config.ligands = resolve_all("ligands", input.ligands, working_directory)?;
        config.batch = resolve_all("batch", input.batch, working_directory)?;
        if let Some(scoring) = input.scoring {
            config.scoring = scoring.parse()?;
        }

        config.maps = resolve_optional("maps", search_area.maps, working_directory)?;
        let assign = |target: &mut f64, value: Option<f64>| {
            if let Some(value) = value {
                *target = value
            }
        };
        assign(&mut config.center_x, search_area.center_x);
        assign(&mut config.center_y, search_area.center_y);
        assign(&mut config.center_z, search_area.center_z);
        assign(&mut config.size_x, search_area.size_x);
        assign(&mut config.size_y, search_area.size_y);
        assign(&mut config.size_z, search_area.size_z);
        config.autobox = search_area.autobox.unwrap_or(config.autobox);

        config.out = resolve_optional("out", output.out, working_directory)?;
        config.dir = resolve_optional("dir", output.dir, working_directory)?;
        config.write_maps = resolve_optional("write_maps", output.write_maps, working_directory)?;

        config.score_only = advanced.score_only.unwrap_or(config.score_only);
        config.local_only = advanced.local_only.unwrap_or(config.local_only);
        config.no_refine = advanced.no_refine.unwrap_or(config.no_refine);
        config.force_even_voxels = advanced
            .force_even_voxels
            .unwrap_or(config.force_even_voxels);
        config.randomize_only = advanced.randomize_only.unwrap_or(config.randomize_only);
        let weights = &mut config.weights;
        assign(&mut weights.vina.gauss1, advanced.weight_gauss1);
        assign(&mut weights.vina.gauss2, advanced.weight_gauss2);
        assign(&mut weights.vina.repulsion, advanced.weight_repulsion);
        assign(&mut weights.vina.hydrophobic, advanced.weight_hydrophobic);
        assign(&mut weights.vina.hydrogen, advanced.weight_hydrogen);
        assign(&mut weights.vina.rot, advanced.weight_rot);
        assign(&mut weights.vinardo.gauss1, advanced.weight_vinardo_gauss1);
        assign(&mut weights.vinardo.repulsion, advanced.weight_vinardo_repulsion);
        assign(&mut weights.vinardo.hydrophobic, advanced.weight_vinardo_hydrophobic);
        assign(&mut weights.vinardo.hydrogen, advanced.weight_vinardo_hydrogen);
        assign(&mut weights.vinardo.rot, advanced.weight_vinardo_rot);
        assign(&mut weights.ad4.vdw, advanced.weight_ad4_vdw);
        assign(&mut weights.ad4.hb, advanced.weight_ad4_hb);
        assign(&mut weights.ad4.elec, advanced.weight_ad4_elec);
        assign(&mut weights.ad4.dsolv, advanced.weight_ad4_dsolv);
        assign(&mut weights.ad4.rot, advanced.weight_ad4_rot);
        assign(&mut weights.glue, advanced.weight_glue);

        config.cpu = misc.cpu.unwrap_or(config.cpu);
        config.seed = misc.seed.unwrap_or(config.seed);
        config.exhaustiveness = misc.exhaustiveness.unwrap_or(config.exhaustiveness);
        config.max_evals = misc.max_evals.unwrap_or(config.max_evals);
        config.num_modes = misc.num_modes.unwrap_or(config.num_modes);
        assign(&mut config.min_rmsd, misc.min_rmsd);
        assign(&mut config.energy_range, misc.energy_range);
        assign(&mut config.spacing, misc.spacing);
        config.verbosity = misc.verbosity.unwrap_or(config.verbosity);

        if config.out.is_none() {
            config.out = match flavor {
                SchemaFlavor::Flat if !config.score_only && config.dir.is_none() => {
                    Some(working_directory.join(DEFAULT_OUT))
                }
                SchemaFlavor::Flat => None,
                SchemaFlavor::Nested if !config.score_only && config.ligands.len() == 1 => {
                    Some(config.ligands[0].clone())
                }
                SchemaFlavor::Nested => None,
            };
        }

        Ok(config)
    }

    fn to_sections(&self) -> Sections {
        let names = |paths: &[PathBuf]| -> Option<OneOrMany> {
            if paths.is_empty() {
                None
            } else {
                Some(OneOrMany::Many(
                    paths.iter().map(|path| file_name(path)).collect(),
                ))
            }
        };
        let name = |path: &Option<PathBuf>| path.as_deref().map(file_name);
        let weights = &self.weights;
        Sections {
            input: InputSection {
                receptor: name(&self.receptor).map(OneOrMany::One),
                flex: name(&self.flex),
                ligands: names(&self.ligands),
                batch: names(&self.batch),
                scoring: Some(self.scoring.name().to_string()),
            },
            search_area: SearchAreaSection {
                maps: name(&self.maps),
                center_x: Some(self.center_x),
                center_y: Some(self.center_y),
                center_z: Some(self.center_z),
                size_x: Some(self.size_x),
                size_y: Some(self.size_y),
                size_z: Some(self.size_z),
                autobox: Some(self.autobox),
            },
            output: OutputSection {
                out: name(&self.out),
                dir: name(&self.dir),
                write_maps: name(&self.write_maps),
            },
            advanced: AdvancedSection {
                score_only: Some(self.score_only),
                local_only: Some(self.local_only),
                no_refine: Some(self.no_refine),
                force_even_voxels: Some(self.force_even_voxels),
                randomize_only: Some(self.randomize_only),
                weight_gauss1: Some(weights.vina.gauss1),
                weight_gauss2: Some(weights.vina.gauss2),
                weight_repulsion: Some(weights.vina.repulsion),
                weight_hydrophobic: Some(weights.vina.hydrophobic),
                weight_hydrogen: Some(weights.vina.hydrogen),
                weight_rot: Some(weights.vina.rot),
                weight_vinardo_gauss1: Some(weights.vinardo.gauss1),
                weight_vinardo_repulsion: Some(weights.vinardo.repulsion),
                weight_vinardo_hydrophobic: Some(weights.vinardo.hydrophobic),
                weight_vinardo_hydrogen: Some(weights.vinardo.hydrogen),
                weight_vinardo_rot: Some(weights.vinardo.rot),
                weight_ad4_vdw: Some(weights.ad4.vdw),
                weight_ad4_hb: Some(weights.ad4.hb),
                weight_ad4_elec: Some(weights.ad4.elec),
                weight_ad4_dsolv: Some(weights.ad4.dsolv),
                weight_ad4_rot: Some(weights.ad4.rot),
                weight_glue: Some(weights.glue),
            },
            misc: MiscSection {
                cpu: Some(self.cpu),
                seed: Some(self.seed),
                exhaustiveness: Some(self.exhaustiveness),
                max_evals: Some(self.max_evals),
                num_modes: Some(self.num_modes),
                min_rmsd: Some(self.min_rmsd),
                energy_range: Some(self.energy_range),
                spacing: Some(self.spacing),
                verbosity: Some(self.verbosity),
            },
        }
    }

    pub fn to_writer<W: Write>(&self, writer: W, flavor: SchemaFlavor) -> Result<(), ConfigError> {
        let document = self.to_sections().to_value(flavor)?;
        serde_json::to_writer_pretty(writer, &document)?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, config_file: P) -> Result<(), ConfigError> {
        self.save_as(config_file, SchemaFlavor::Nested)
    }

    pub fn save_as<P: AsRef<Path>>(
        &self,
        config_file: P,
        flavor: SchemaFlavor,
    ) -> Result<(), ConfigError> {
        let config_file = config_file.as_ref();
        let write_error = |source| ConfigError::Write {
            path: config_file.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(config_file).map_err(write_error)?);
        self.to_writer(&mut writer, flavor)?;
        writer.flush().map_err(write_error)
    }

    pub fn center(&self) -> Vector3<f64> {
        Vector3::new(self.center_x, self.center_y, self.center_z)
    }

    pub fn size(&self) -> Vector3<f64> {
        Vector3::new(self.size_x, self.size_y, self.size_z)
    }

    pub fn gpf_filename(&self) -> Option<PathBuf> {
        self.maps.as_deref().map(gpf_filename)
    }

    /// Files referenced by the grid parameter file. An unreadable gpf gives
    /// an empty list, the gpf itself is still checked by `get_files`.
    pub fn get_files_from_gpf(&self) -> Vec<PathBuf> {
        let Some(gpf) = self.gpf_filename() else {
            return vec![];
        };
        files_from_gpf(&gpf).unwrap_or_else(|err| {
            warn!("{}", err);
            vec![]
        })
    }

    /// Every input file the job needs.
    pub fn get_files(&self) -> Vec<PathBuf> {
        let mut files = vec![];
        files.extend(self.receptor.clone());
        files.extend(self.ligands.iter().cloned());
        files.extend(self.flex.clone());
        files.extend(self.batch.iter().cloned());
        if let Some(gpf) = self.gpf_filename() {
            files.push(gpf);
            files.extend(self.get_files_from_gpf());
        }
        files
    }

    pub fn check_files_exist(&self) -> Result<(), ValidationError> {
        match self.get_files().into_iter().find(|file| !file.is_file()) {
            Some(missing) => Err(ValidationError::MissingFile(missing)),
            None => Ok(()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.check_rules()?;
        self.check_files_exist()
    }

    fn check_rules(&self) -> Result<(), ValidationError> {
        if self.receptor.is_some() && self.maps.is_some() {
            return Err(ValidationError::ReceptorAndMaps);
        }
        if self.scoring.requires_maps() {
            if self.receptor.is_some() {
                return Err(ValidationError::ReceptorWithAd4);
            }
            if self.maps.is_none() {
                return Err(ValidationError::MissingMapsForAd4);
            }
        } else if self.receptor.is_none() && self.maps.is_none() {
            return Err(ValidationError::MissingReceptorOrMaps);
        }
        if self.ligands.is_empty() && self.batch.is_empty() {
            return Err(ValidationError::MissingLigands);
        }
        if !self.ligands.is_empty() && !self.batch.is_empty() {
            return Err(ValidationError::LigandsAndBatch);
        }
        if !self.batch.is_empty() && self.dir.is_none() {
            return Err(ValidationError::MissingBatchDir);
        }
        if !self.score_only
            && self.out.is_none()
            && self.dir.is_none()
            && self.ligands.len() > 1
        {
            return Err(ValidationError::MissingOut);
        }
        Ok(())
    }

    /// Output of a single-ligand job, the ligand path itself when no `out`
    /// was given.
    pub fn resolved_out(&self) -> Option<PathBuf> {
        self.out.clone().or_else(|| match self.ligands.as_slice() {
            [ligand] if !self.score_only => Some(ligand.clone()),
            _ => None,
        })
    }

    /// Directory results of a multi-ligand fan-out are written to: `dir`,
    /// or `out` with its extension stripped.
    pub fn ligand_output_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| self.out.as_ref().map(|out| out.with_extension("")))
    }

    /// Files produced by the job, for packing a result archive: `out`, the
    /// regular files in `dir` or in the fan-out directory of a multi-ligand
    /// job, and every map written with the `write_maps` prefix.
    pub fn get_out_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = vec![];
        if let Some(out) = self.out.as_ref().filter(|out| out.is_file()) {
            files.push(out.clone());
        }
        let mut dirs = vec![];
        dirs.extend(self.dir.clone());
        if self.ligands.len() > 1 {
            dirs.extend(self.ligand_output_dir());
        }
        for dir in dirs.iter().filter(|dir| dir.is_dir()) {
            for entry in std::fs::read_dir(dir)
                .with_context(|| format!("Unable to list output directory {:?}", dir))?
            {
                let path = entry
                    .with_context(|| format!("Unable to read entry of {:?}", dir))?
                    .path();
                if path.is_file() && !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        if let Some(write_maps) = &self.write_maps {
            let parent = write_maps.parent().unwrap_or_else(|| Path::new(""));
            let prefix = write_maps
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let pattern = [
                Pattern::escape(&parent.to_string_lossy()),
                format!("{}*", Pattern::escape(&prefix)),
            ]
            .iter()
            .collect::<PathBuf>()
            .to_string_lossy()
            .to_string();
            debug!("Collecting written maps with pattern {:?}", pattern);
            for path in glob(&pattern).with_context(|| format!("Invalid map pattern {:?}", pattern))? {
                let path = path.with_context(|| format!("Unable to read maps matching {:?}", pattern))?;
                if path.is_file() && !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}
