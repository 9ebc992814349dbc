//! The seam between a job description and whatever performs the docking.
//!
//! [`DockingInvoker`] turns a [`Config`] into the call sequence a Vina style
//! engine expects; [`DockingEngine`] is implemented by the engine itself.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use nalgebra::Vector3;
use tracing::{debug, info};
use vina_job::{batch::batch_output, Config, Scoring, WeightSet};

/// Receives the completion fraction of the running search, in `[0, 1]`.
pub type ProgressCallback = Box<dyn FnMut(f64) + Send>;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub scoring: Scoring,
    pub cpu: i64,
    pub seed: i64,
    pub verbosity: i64,
    pub no_refine: bool,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            scoring: config.scoring,
            cpu: config.cpu,
            seed: config.seed,
            verbosity: config.verbosity,
            no_refine: config.no_refine,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParameters {
    pub exhaustiveness: i64,
    pub num_modes: i64,
    pub min_rmsd: f64,
    pub max_evals: i64,
}

impl From<&Config> for SearchParameters {
    fn from(config: &Config) -> Self {
        Self {
            exhaustiveness: config.exhaustiveness,
            num_modes: config.num_modes,
            min_rmsd: config.min_rmsd,
            max_evals: config.max_evals,
        }
    }
}

pub trait DockingEngine {
    fn set_receptor(&mut self, receptor: Option<&Path>, flex: Option<&Path>) -> Result<()>;
    fn set_weights(&mut self, weights: WeightSet) -> Result<()>;
    fn load_maps(&mut self, maps: &Path) -> Result<()>;
    fn compute_vina_maps(
        &mut self,
        center: Vector3<f64>,
        size: Vector3<f64>,
        spacing: f64,
        force_even_voxels: bool,
    ) -> Result<()>;
    fn write_maps(&mut self, prefix: &Path) -> Result<()>;
    fn set_ligands(&mut self, ligands: &[PathBuf]) -> Result<()>;
    fn randomize(&mut self) -> Result<()>;
    fn score(&mut self) -> Result<Vec<f64>>;
    fn optimize(&mut self) -> Result<Vec<f64>>;
    fn global_search(&mut self, parameters: &SearchParameters) -> Result<()>;
    fn write_pose(&mut self, out: &Path) -> Result<()>;
    fn write_poses(&mut self, out: &Path, num_modes: i64, energy_range: f64) -> Result<()>;
}

/// Builds one engine per job, the runner calls it on its worker thread.
pub trait EngineFactory {
    type Engine: DockingEngine;

    fn create(&self, settings: &EngineSettings, progress: ProgressCallback)
        -> Result<Self::Engine>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Randomize,
    Score,
    LocalOptimize,
    GlobalSearch,
}

impl Mode {
    /// `randomize_only` wins over `score_only`, which wins over `local_only`.
    pub fn of(config: &Config) -> Self {
        if config.randomize_only {
            Self::Randomize
        } else if config.score_only {
            Self::Score
        } else if config.local_only {
            Self::LocalOptimize
        } else {
            Self::GlobalSearch
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DockingOutcome {
    pub ligand: PathBuf,
    pub mode: Mode,
    pub output: Option<PathBuf>,
    pub energies: Vec<f64>,
}

pub struct DockingInvoker<E> {
    engine: E,
    grid_ready: bool,
}

impl<E: DockingEngine> DockingInvoker<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            grid_ready: false,
        }
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Receptor and weights, plus the precomputed maps of an AD4 job. Done
    /// once before any sub-job is docked.
    pub fn prepare(&mut self, config: &Config) -> Result<()> {
        if config.receptor.is_some() || config.flex.is_some() {
            self.engine
                .set_receptor(config.receptor.as_deref(), config.flex.as_deref())?;
        }
        self.engine.set_weights(config.weights.select(config.scoring))?;
        if config.scoring.requires_maps() {
            let maps = config
                .maps
                .as_ref()
                .ok_or_else(|| anyhow!("The AD4 scoring function requires maps"))?;
            self.engine.load_maps(maps)?;
            if let Some(prefix) = &config.write_maps {
                self.engine.write_maps(prefix)?;
            }
        }
        Ok(())
    }

    /// Dock every ligand of `config`: the ligand set as a whole, or each
    /// batch entry in turn.
    pub fn dock(&mut self, config: &Config) -> Result<Vec<DockingOutcome>> {
        if !config.ligands.is_empty() {
            self.engine.set_ligands(&config.ligands)?;
            self.grid(config)?;
            let outcome = self.run_mode(config, &config.ligands[0], config.resolved_out())?;
            return Ok(vec![outcome]);
        }
        config
            .batch
            .iter()
            .map(|entry| {
                self.engine.set_ligands(std::slice::from_ref(entry))?;
                self.grid(config)?;
                let out = batch_output(config, entry)?;
                self.run_mode(config, entry, Some(out))
            })
            .collect()
    }

    /// Vina and Vinardo grids need a ligand to be set, they are loaded or
    /// computed once, after the first ligand.
    fn grid(&mut self, config: &Config) -> Result<()> {
        if config.scoring.requires_maps() || self.grid_ready {
            return Ok(());
        }
        self.grid_ready = true;
        if let Some(maps) = &config.maps {
            return self.engine.load_maps(maps);
        }
        self.engine.compute_vina_maps(
            config.center(),
            config.size(),
            config.spacing,
            config.force_even_voxels,
        )?;
        if let Some(prefix) = &config.write_maps {
            self.engine.write_maps(prefix)?;
        }
        Ok(())
    }

    fn run_mode(
        &mut self,
        config: &Config,
        ligand: &Path,
        out: Option<PathBuf>,
    ) -> Result<DockingOutcome> {
        let mode = Mode::of(config);
        debug!("Docking {:?} in mode {:?}", ligand, mode);
        let required_out = || {
            out.clone()
                .ok_or_else(|| anyhow!("No output file for {:?} in mode {:?}", ligand, mode))
        };
        let energies = match mode {
            Mode::Randomize => {
                self.engine.randomize()?;
                self.engine.write_pose(&required_out()?)?;
                vec![]
            }
            Mode::Score => {
                let energies = self.engine.score()?;
                show_score(ligand, &energies);
                energies
            }
            Mode::LocalOptimize => {
                let energies = self.engine.optimize()?;
                self.engine.write_pose(&required_out()?)?;
                show_score(ligand, &energies);
                energies
            }
            Mode::GlobalSearch => {
                self.engine.global_search(&SearchParameters::from(config))?;
                self.engine
                    .write_poses(&required_out()?, config.num_modes, config.energy_range)?;
                vec![]
            }
        };
        Ok(DockingOutcome {
            ligand: ligand.to_path_buf(),
            mode,
            output: if mode == Mode::Score { None } else { out },
            energies,
        })
    }
}

fn show_score(ligand: &Path, energies: &[f64]) {
    match energies.first() {
        Some(total) => info!(
            "Estimated free energy of binding for {:?}: {:.3} kcal/mol",
            ligand, total
        ),
        None => info!("No energy reported for {:?}", ligand),
    }
}

#[cfg(test)]
pub(crate) mod recording {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Engine double that records every call; failures can be scripted by
    /// ligand file name.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingEngine {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub fail_on: Option<String>,
        pub(crate) ligand: Option<PathBuf>,
    }

    impl RecordingEngine {
        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self) -> Result<()> {
            match (&self.fail_on, &self.ligand) {
                (Some(name), Some(ligand)) if ligand.ends_with(name) => {
                    Err(anyhow!("engine failure on {}", name))
                }
                _ => Ok(()),
            }
        }
    }

    fn name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    impl DockingEngine for RecordingEngine {
        fn set_receptor(&mut self, receptor: Option<&Path>, flex: Option<&Path>) -> Result<()> {
            self.log(format!(
                "set_receptor {} {}",
                receptor.map(name).unwrap_or_default(),
                flex.map(name).unwrap_or_default()
            ));
            Ok(())
        }

        fn set_weights(&mut self, weights: WeightSet) -> Result<()> {
            let scoring = match weights {
                WeightSet::Vina { .. } => "vina",
                WeightSet::Vinardo { .. } => "vinardo",
                WeightSet::Ad4 { .. } => "ad4",
            };
            self.log(format!("set_weights {}", scoring));
            Ok(())
        }

        fn load_maps(&mut self, maps: &Path) -> Result<()> {
            self.log(format!("load_maps {}", name(maps)));
            Ok(())
        }

        fn compute_vina_maps(
            &mut self,
            center: Vector3<f64>,
            size: Vector3<f64>,
            spacing: f64,
            _force_even_voxels: bool,
        ) -> Result<()> {
            self.log(format!(
                "compute_vina_maps {} {} {} {} {} {} {}",
                center.x, center.y, center.z, size.x, size.y, size.z, spacing
            ));
            Ok(())
        }

        fn write_maps(&mut self, prefix: &Path) -> Result<()> {
            self.log(format!("write_maps {}", name(prefix)));
            Ok(())
        }

        fn set_ligands(&mut self, ligands: &[PathBuf]) -> Result<()> {
            self.ligand = ligands.first().cloned();
            let names = ligands.iter().map(|path| name(path)).collect::<Vec<_>>();
            self.log(format!("set_ligands {}", names.join(",")));
            Ok(())
        }

        fn randomize(&mut self) -> Result<()> {
            self.log("randomize".to_string());
            self.check()
        }

        fn score(&mut self) -> Result<Vec<f64>> {
            self.log("score".to_string());
            self.check()?;
            Ok(vec![-7.2])
        }

        fn optimize(&mut self) -> Result<Vec<f64>> {
            self.log("optimize".to_string());
            self.check()?;
            Ok(vec![-7.5])
        }

        fn global_search(&mut self, parameters: &SearchParameters) -> Result<()> {
            self.log(format!(
                "global_search {} {}",
                parameters.exhaustiveness, parameters.num_modes
            ));
            self.check()
        }

        fn write_pose(&mut self, out: &Path) -> Result<()> {
            self.log(format!("write_pose {}", name(out)));
            std::fs::write(out, "MODEL 1\nENDMDL\n")?;
            Ok(())
        }

        fn write_poses(&mut self, out: &Path, num_modes: i64, _energy_range: f64) -> Result<()> {
            self.log(format!("write_poses {} {}", name(out), num_modes));
            std::fs::write(out, "MODEL 1\nENDMDL\n")?;
            Ok(())
        }
    }

    /// Hands out engines sharing one call log.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingFactory {
        pub engine: RecordingEngine,
    }

    impl EngineFactory for RecordingFactory {
        type Engine = RecordingEngine;

        fn create(
            &self,
            settings: &EngineSettings,
            mut progress: ProgressCallback,
        ) -> Result<RecordingEngine> {
            self.engine.log(format!("create {}", settings.scoring));
            progress(0.5);
            Ok(self.engine.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{recording::RecordingEngine, *};

    fn job(wd: &Path) -> Config {
        Config {
            receptor: Some(wd.join("receptor.pdbqt")),
            ligands: vec![wd.join("ligand.pdbqt")],
            out: Some(wd.join("out.pdbqt")),
            center_x: 15.19,
            center_y: 53.903,
            center_z: 16.917,
            size_x: 20.,
            size_y: 20.,
            size_z: 20.,
            ..Default::default()
        }
    }

    fn run(config: &Config) -> (Vec<DockingOutcome>, Vec<String>) {
        let mut invoker = DockingInvoker::new(RecordingEngine::default());
        invoker.prepare(config).unwrap();
        let outcomes = invoker.dock(config).unwrap();
        (outcomes, invoker.into_engine().calls())
    }

    #[test]
    fn global_search_is_the_default() {
        let directory = tempfile::tempdir().unwrap();
        let config = job(directory.path());
        let (outcomes, calls) = run(&config);
        assert_eq!(
            calls,
            vec![
                "set_receptor receptor.pdbqt ",
                "set_weights vina",
                "set_ligands ligand.pdbqt",
                "compute_vina_maps 15.19 53.903 16.917 20 20 20 0.375",
                "global_search 8 9",
                "write_poses out.pdbqt 9",
            ]
        );
        assert_eq!(outcomes[0].mode, Mode::GlobalSearch);
        assert!(directory.path().join("out.pdbqt").is_file());
    }

    #[test]
    fn mode_precedence() {
        let mut config = Config::default();
        config.local_only = true;
        assert_eq!(Mode::of(&config), Mode::LocalOptimize);
        config.score_only = true;
        assert_eq!(Mode::of(&config), Mode::Score);
        config.randomize_only = true;
        assert_eq!(Mode::of(&config), Mode::Randomize);
    }

    #[test]
    fn score_only_writes_nothing() {
        let directory = tempfile::tempdir().unwrap();
        let mut config = job(directory.path());
        config.score_only = true;
        config.local_only = true;
        let (outcomes, calls) = run(&config);
        assert_eq!(calls.last().unwrap(), "score");
        assert_eq!(outcomes[0].energies, vec![-7.2]);
        assert_eq!(outcomes[0].output, None);
        assert!(!directory.path().join("out.pdbqt").exists());
    }

    #[test]
    fn local_optimization_writes_one_pose() {
        let directory = tempfile::tempdir().unwrap();
        let mut config = job(directory.path());
        config.local_only = true;
        config.out = None;
        let (outcomes, calls) = run(&config);
        assert_eq!(&calls[calls.len() - 2..], ["optimize", "write_pose ligand.pdbqt"]);
        assert_eq!(outcomes[0].output, Some(directory.path().join("ligand.pdbqt")));
    }

    #[test]
    fn randomize_only_wins() {
        let directory = tempfile::tempdir().unwrap();
        let mut config = job(directory.path());
        config.randomize_only = true;
        config.score_only = true;
        let (_, calls) = run(&config);
        assert_eq!(&calls[calls.len() - 2..], ["randomize", "write_pose out.pdbqt"]);
    }

    #[test]
    fn ad4_loads_maps_once_before_ligands() {
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        let config = Config {
            scoring: Scoring::Ad4,
            maps: Some(wd.join("1iep_receptor")),
            flex: Some(wd.join("flex.pdbqt")),
            ligands: vec![wd.join("ligand.pdbqt")],
            out: Some(wd.join("out.pdbqt")),
            write_maps: Some(wd.join("written")),
            ..Default::default()
        };
        let (_, calls) = run(&config);
        assert_eq!(
            &calls[..5],
            [
                "set_receptor  flex.pdbqt",
                "set_weights ad4",
                "load_maps 1iep_receptor",
                "write_maps written",
                "set_ligands ligand.pdbqt",
            ]
        );
        assert!(!calls.iter().any(|call| call.starts_with("compute_vina_maps")));
    }

    #[test]
    fn vina_maps_are_loaded_when_given() {
        let directory = tempfile::tempdir().unwrap();
        let mut config = job(directory.path());
        config.receptor = None;
        config.maps = Some(directory.path().join("1iep_receptor"));
        config.write_maps = Some(directory.path().join("written"));
        let (_, calls) = run(&config);
        assert_eq!(calls[0], "set_weights vina");
        assert_eq!(calls[2], "load_maps 1iep_receptor");
        assert!(!calls.iter().any(|call| call.starts_with("write_maps")));
    }

    #[test]
    fn batch_entries_are_docked_into_dir() {
        let directory = tempfile::tempdir().unwrap();
        let wd = directory.path();
        fs::create_dir_all(wd.join("results")).unwrap();
        let config = Config {
            scoring: Scoring::Vinardo,
            receptor: Some(wd.join("receptor.pdbqt")),
            batch: vec![wd.join("a.pdbqt"), wd.join("b.pdbqt")],
            dir: Some(wd.join("results")),
            ..Default::default()
        };
        let (outcomes, calls) = run(&config);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].output, Some(wd.join("results").join("b.pdbqt")));
        assert!(calls.contains(&"set_weights vinardo".to_string()));
        assert!(calls.contains(&"write_poses b.pdbqt 9".to_string()));
        assert_eq!(
            calls
                .iter()
                .filter(|call| call.starts_with("compute_vina_maps"))
                .count(),
            1
        );
        assert!(wd.join("results").join("a.pdbqt").is_file());
    }

    #[test]
    fn engine_failure_is_propagated() {
        let directory = tempfile::tempdir().unwrap();
        let config = job(directory.path());
        let engine = RecordingEngine {
            fail_on: Some("ligand.pdbqt".to_string()),
            ..Default::default()
        };
        let mut invoker = DockingInvoker::new(engine);
        invoker.prepare(&config).unwrap();
        assert!(invoker.dock(&config).is_err());
    }

    #[test]
    fn settings_follow_config() {
        let config = Config {
            scoring: Scoring::Vinardo,
            cpu: 4,
            seed: 42,
            no_refine: true,
            ..Default::default()
        };
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.scoring, Scoring::Vinardo);
        assert_eq!((settings.cpu, settings.seed, settings.verbosity), (4, 42, 1));
        assert!(settings.no_refine);
    }
}
