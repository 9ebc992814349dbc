//! Turns a job document into work unit archives, preparing receptors and
//! ligands with external tools when asked to.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};
use vina_job::{
    archive::create_work_unit,
    config::working_directory_of,
    error::ConfigError,
    Config, SchemaFlavor,
};

use crate::{
    directives::{is_pdbqt, PrepareLigands, PrepareReceptors},
    tools::Toolbox,
};

/// Key holding the job itself when the document also carries directives.
/// Without it the whole document is the job.
pub const CONFIG_KEY: &str = "config";
pub const DEFAULT_PREFIX: &str = "wu_";

/// A positive seed fitting in 31 bits, as `seed == 0` means "pick one".
pub fn generate_seed() -> i64 {
    rand::thread_rng().gen_range(1..=i64::from(i32::MAX))
}

pub struct WorkGenerator {
    toolbox: Toolbox,
    prefix: String,
    flavor: SchemaFlavor,
    current_wu_number: u64,
}

impl WorkGenerator {
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox,
            prefix: DEFAULT_PREFIX.to_string(),
            flavor: SchemaFlavor::Nested,
            current_wu_number: 0,
        }
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_flavor(mut self, flavor: SchemaFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    fn next_archive(&mut self, out_dir: &Path) -> PathBuf {
        self.current_wu_number += 1;
        out_dir.join(format!("{}{}.zip", self.prefix, self.current_wu_number))
    }

    /// Parse `config_file`, run the preparation directives it carries, then
    /// validate and package one work unit per prepared receptor into
    /// `out_dir`. Returns the archives written.
    pub fn process(&mut self, config_file: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
        if !config_file.is_file() {
            return Err(ConfigError::NotAFile(config_file.to_path_buf()).into());
        }
        let document: Value = serde_json::from_reader(
            File::open(config_file)
                .with_context(|| format!("Failed to open {:?}", config_file))?,
        )
        .map_err(|source| ConfigError::Json {
            path: config_file.to_path_buf(),
            source,
        })?;
        let working_directory = working_directory_of(config_file);

        let prepare_receptors = match document.get(PrepareReceptors::KEY) {
            Some(value) => {
                let directive = PrepareReceptors::from_json(value, &working_directory)?;
                directive.validate()?;
                directive
            }
            None => PrepareReceptors::default(),
        };
        let prepare_ligands = match document.get(PrepareLigands::KEY) {
            Some(value) => {
                let directive = PrepareLigands::from_json(value, &working_directory)?;
                directive.validate()?;
                directive
            }
            None => PrepareLigands::default(),
        };

        let job = document.get(CONFIG_KEY).unwrap_or(&document);
        let mut config = Config::from_json(job, &working_directory)?;
        if config.seed == 0 {
            config.seed = generate_seed();
            info!("Generated seed {}", config.seed);
        }

        let staging = tempfile::tempdir().context("Unable to create staging directory")?;
        if prepare_ligands.has_data() {
            self.substitute_ligands(&mut config, &prepare_ligands, staging.path())?;
        }
        let configs = if prepare_receptors.has_data() {
            self.fan_out_receptors(&config, &prepare_receptors, staging.path())?
        } else {
            vec![config]
        };

        for config in &configs {
            config.validate().with_context(|| {
                format!("Config from {:?} is not a valid job", config_file)
            })?;
        }
        self.package(&configs, out_dir)
    }

    /// All work units of one document or none: on failure the archives
    /// already written are removed and the counter is rewound.
    fn package(&mut self, configs: &[Config], out_dir: &Path) -> Result<Vec<PathBuf>> {
        let first_wu_number = self.current_wu_number;
        let mut archives = vec![];
        for config in configs {
            let archive = self.next_archive(out_dir);
            if let Err(err) = create_work_unit(config, &archive, self.flavor) {
                for written in &archives {
                    if let Err(err) = std::fs::remove_file(written) {
                        warn!("Unable to remove work unit {:?}: {}", written, err);
                    }
                }
                self.current_wu_number = first_wu_number;
                return Err(err.into());
            }
            archives.push(archive);
        }
        Ok(archives)
    }

    /// Prepare the directive's ligands, or the job's own when the directive
    /// names none, and point the job at the results.
    fn substitute_ligands(
        &self,
        config: &mut Config,
        directive: &PrepareLigands,
        staging: &Path,
    ) -> Result<()> {
        let sources = if directive.ligands.is_empty() {
            config.ligands.clone()
        } else {
            directive.ligands.clone()
        };
        let mut prepared = vec![];
        for ligand in &sources {
            if is_pdbqt(ligand) && !directive.options_requested() {
                prepared.push(ligand.clone());
                continue;
            }
            prepared.extend(self.toolbox.prepare_ligand(directive, ligand, staging)?);
        }
        // a defaulted `out` points at the ligand it was derived from
        if config.out.is_some() && config.out.as_ref() == config.ligands.first() {
            config.out = match prepared.as_slice() {
                [single] => Some(single.clone()),
                _ => None,
            };
        }
        config.ligands = prepared;
        Ok(())
    }

    /// One job per receptor, each with its prepared receptor.
    fn fan_out_receptors(
        &self,
        config: &Config,
        directive: &PrepareReceptors,
        staging: &Path,
    ) -> Result<Vec<Config>> {
        let sources = if directive.receptors.is_empty() {
            config.receptor.iter().cloned().collect()
        } else {
            directive.receptors.clone()
        };
        sources
            .iter()
            .map(|receptor| -> Result<Config> {
                let prepared = if is_pdbqt(receptor) && !directive.options_requested() {
                    receptor.clone()
                } else {
                    self.toolbox.prepare_receptor(directive, receptor, staging)?
                };
                let mut job = config.clone();
                job.receptor = Some(prepared);
                Ok(job)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use vina_job::archive::{extract, CONFIG_ENTRY};

    use super::*;

    fn write_json(path: &Path, value: &Value) {
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn unpack(archive: &Path) -> Config {
        let target = archive.with_extension("");
        extract(archive, &target).unwrap();
        Config::load(target.join(CONFIG_ENTRY)).unwrap()
    }

    #[test]
    fn already_prepared_config_is_packaged() {
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        fs::write(wd.join("receptor_sample"), "").unwrap();
        fs::write(wd.join("ligand_sample1"), "").unwrap();
        let config_file = wd.join("dummy.json");
        write_json(
            &config_file,
            &json!({
                "input": {"receptor": "receptor_sample", "ligands": ["ligand_sample1"]},
                "search_area": {
                    "center_x": 0.123456, "center_y": 0.654321, "center_z": -0.123456,
                    "size_x": -0.654321, "size_y": 0.0, "size_z": -0.000135
                },
                "output": {"out": "out_sample"}
            }),
        );

        let mut generator = WorkGenerator::new(Toolbox::default());
        let archives = generator.process(&config_file, wd).unwrap();
        assert_eq!(archives, vec![wd.join("wu_1.zip")]);

        let config = unpack(&archives[0]);
        let target = wd.join("wu_1");
        assert_eq!(config.receptor, Some(target.join("receptor_sample")));
        assert_eq!(config.ligands, vec![target.join("ligand_sample1")]);
        assert_eq!(config.center_x, 0.123456);
        assert_eq!(config.center_y, 0.654321);
        assert_eq!(config.center_z, -0.123456);
        assert_eq!(config.size_x, -0.654321);
        assert_eq!(config.size_y, 0.0);
        assert_eq!(config.size_z, -0.000135);
        assert_eq!(config.out, Some(target.join("out_sample")));
        assert!(config.seed > 0);
        assert_eq!(config.validate(), Ok(()));

        let next = generator.process(&config_file, wd).unwrap();
        assert_eq!(next, vec![wd.join("wu_2.zip")]);
    }

    #[test]
    fn given_seed_is_kept() {
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        fs::write(wd.join("receptor.pdbqt"), "").unwrap();
        fs::write(wd.join("ligand.pdbqt"), "").unwrap();
        let config_file = wd.join("job.json");
        write_json(
            &config_file,
            &json!({"receptor": "receptor.pdbqt", "ligand": "ligand.pdbqt", "seed": 42}),
        );
        let archives = WorkGenerator::new(Toolbox::default())
            .with_prefix("job_")
            .with_flavor(SchemaFlavor::Flat)
            .process(&config_file, wd)
            .unwrap();
        assert_eq!(archives, vec![wd.join("job_1.zip")]);
        assert_eq!(unpack(&archives[0]).seed, 42);
    }

    #[test]
    fn seeds_are_positive_31_bit() {
        for _ in 0..100 {
            let seed = generate_seed();
            assert!(seed > 0 && seed <= i64::from(i32::MAX));
        }
    }

    #[test]
    fn absolute_receptor_fails() {
        let directory = tempfile::tempdir().unwrap();
        let config_file = directory.path().join("dummy.json");
        write_json(
            &config_file,
            &json!({"prepare_receptors": {"receptors": ["/home/test/receptor_sample"]}}),
        );
        let mut generator = WorkGenerator::new(Toolbox::default());
        assert!(generator.process(&config_file, directory.path()).is_err());
    }

    #[test]
    fn missing_receptor_fails() {
        let directory = tempfile::tempdir().unwrap();
        let config_file = directory.path().join("dummy.json");
        write_json(
            &config_file,
            &json!({"prepare_receptors": {"receptors": ["receptor_sample"]}}),
        );
        let mut generator = WorkGenerator::new(Toolbox::default());
        let err = generator.process(&config_file, directory.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("receptor_sample"));
        assert!(!directory.path().join("wu_1.zip").exists());
    }

    #[test]
    fn malformed_document_fails() {
        let directory = tempfile::tempdir().unwrap();
        let config_file = directory.path().join("dummy.json");
        fs::write(&config_file, "{\"input\": ").unwrap();
        let mut generator = WorkGenerator::new(Toolbox::default());
        assert!(generator.process(&config_file, directory.path()).is_err());
        assert!(generator
            .process(&directory.path().join("absent.json"), directory.path())
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn receptors_fan_out_into_work_units() {
        let tools = tempfile::tempdir().unwrap();
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        for name in ["1iep.pdb", "2hzn.pdb", "ligand.pdbqt"] {
            fs::write(wd.join(name), name).unwrap();
        }
        let config_file = wd.join("job.json");
        write_json(
            &config_file,
            &json!({
                "prepare_receptors": {
                    "receptors": ["1iep.pdb", "2hzn.pdb"],
                    "repair": "bonds_hydrogens",
                    "cleanup": "waters"
                },
                "config": {
                    "input": {"ligands": ["ligand.pdbqt"]},
                    "search_area": {"size_x": 20, "size_y": 20, "size_z": 20},
                    "output": {"out": "out.pdbqt"}
                }
            }),
        );
        let out_dir = wd.join("units");
        fs::create_dir_all(&out_dir).unwrap();

        let archives = WorkGenerator::new(crate::tools::fake::toolbox(tools.path()))
            .process(&config_file, &out_dir)
            .unwrap();
        assert_eq!(archives, vec![out_dir.join("wu_1.zip"), out_dir.join("wu_2.zip")]);
        let first = unpack(&archives[0]);
        let second = unpack(&archives[1]);
        assert_eq!(first.receptor, Some(out_dir.join("wu_1").join("1iep.pdbqt")));
        assert_eq!(second.receptor, Some(out_dir.join("wu_2").join("2hzn.pdbqt")));
        assert_eq!(
            fs::read_to_string(out_dir.join("wu_2").join("2hzn.pdbqt")).unwrap(),
            "2hzn.pdb"
        );
        assert_eq!(first.seed, second.seed);

        let calls = crate::tools::fake::calls(tools.path());
        assert_eq!(calls.len(), 2);
        assert!(calls[0].ends_with("-A bonds_hydrogens -U waters"));
    }

    #[cfg(unix)]
    #[test]
    fn ligands_are_prepared_before_packaging() {
        let tools = tempfile::tempdir().unwrap();
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        for name in ["receptor.pdbqt", "1iep_ligand.sdf"] {
            fs::write(wd.join(name), name).unwrap();
        }
        let config_file = wd.join("job.json");
        write_json(
            &config_file,
            &json!({
                "prepare_ligands": {"ph": 7.4},
                "input": {"receptor": "receptor.pdbqt", "ligand": "1iep_ligand.sdf"},
                "search_area": {"size_x": 20, "size_y": 20, "size_z": 20}
            }),
        );
        let archives = WorkGenerator::new(crate::tools::fake::toolbox(tools.path()))
            .process(&config_file, wd)
            .unwrap();
        let config = unpack(&archives[0]);
        let target = wd.join("wu_1");
        assert_eq!(config.ligands, vec![target.join("1iep_ligand.pdbqt")]);
        assert_eq!(config.out, Some(target.join("1iep_ligand.pdbqt")));
        assert!(!target.join("1iep_ligand.sdf").exists());
        assert_eq!(crate::tools::fake::calls(tools.path()).len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn fan_out_packages_all_or_nothing() {
        let tools = tempfile::tempdir().unwrap();
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        // the second prepared receptor clashes with the ligand's file name
        for name in ["1iep.pdb", "2hzn.pdb", "2hzn.pdbqt", "ligand.pdbqt"] {
            fs::write(wd.join(name), name).unwrap();
        }
        let clashing = wd.join("clashing.json");
        write_json(
            &clashing,
            &json!({
                "prepare_receptors": {"receptors": ["1iep.pdb", "2hzn.pdb"]},
                "config": {
                    "input": {"ligands": ["2hzn.pdbqt"]},
                    "output": {"out": "out.pdbqt"}
                }
            }),
        );
        let valid = wd.join("valid.json");
        write_json(
            &valid,
            &json!({
                "prepare_receptors": {"receptors": ["1iep.pdb"]},
                "config": {
                    "input": {"ligands": ["ligand.pdbqt"]},
                    "output": {"out": "out.pdbqt"}
                }
            }),
        );

        let mut generator = WorkGenerator::new(crate::tools::fake::toolbox(tools.path()));
        assert!(generator.process(&clashing, wd).is_err());
        assert!(!wd.join("wu_1.zip").exists());
        assert!(!wd.join("wu_2.zip").exists());

        let archives = generator.process(&valid, wd).unwrap();
        assert_eq!(archives, vec![wd.join("wu_1.zip")]);
    }

    #[test]
    fn invalid_fan_out_writes_nothing() {
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        fs::write(wd.join("1iep.pdbqt"), "").unwrap();
        fs::write(wd.join("2hzn.pdbqt"), "").unwrap();
        let config_file = wd.join("job.json");
        write_json(
            &config_file,
            &json!({
                "prepare_receptors": {"receptors": ["1iep.pdbqt", "2hzn.pdbqt"]},
                "config": {"input": {"ligands": ["absent.pdbqt"]}}
            }),
        );
        let mut generator = WorkGenerator::new(Toolbox::default());
        assert!(generator.process(&config_file, wd).is_err());
        assert!(!wd.join("wu_1.zip").exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_aborts() {
        let tools = tempfile::tempdir().unwrap();
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        fs::write(wd.join("1iep.pdb"), "").unwrap();
        let config_file = wd.join("job.json");
        write_json(
            &config_file,
            &json!({
                "prepare_receptors": {"receptors": "1iep.pdb"},
                "config": {"input": {"ligands": "ligand.pdbqt"}}
            }),
        );
        let mut toolbox = crate::tools::fake::toolbox(tools.path());
        toolbox.prepare_receptor = crate::tools::fake::failing(tools.path());
        let mut generator = WorkGenerator::new(toolbox);
        assert!(generator.process(&config_file, wd).is_err());
        assert!(!wd.join("wu_1.zip").exists());
    }
}
