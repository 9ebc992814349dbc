//! [`DockingEngine`] backed by the `vina` command line program.
//!
//! Setup calls only collect arguments. A process is started when a result is
//! needed: `score` and `optimize` run right away, `randomize` and
//! `global_search` run once their pose is written.

use std::{
    ffi::OsString,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context, Result};
use nalgebra::Vector3;
use tempfile::TempDir;
use tracing::{debug, info};
use vina_job::WeightSet;

use crate::docking::{
    DockingEngine, EngineFactory, EngineSettings, ProgressCallback, SearchParameters,
};

/// Stars vina prints across its progress bar.
const PROGRESS_STARS: usize = 51;

/// Factory for [`VinaProcess`] engines. `leading_args` go before every
/// generated argument, for launchers wrapping the real executable.
#[derive(Debug, Clone, PartialEq)]
pub struct VinaCommand {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl VinaCommand {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            leading_args: vec![],
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl EngineFactory for VinaCommand {
    type Engine = VinaProcess;

    fn create(&self, settings: &EngineSettings, progress: ProgressCallback) -> Result<VinaProcess> {
        let mut base = self.leading_args.clone();
        push(&mut base, "--scoring", settings.scoring.name());
        if settings.cpu > 0 {
            push(&mut base, "--cpu", settings.cpu.to_string());
        }
        if settings.seed != 0 {
            push(&mut base, "--seed", settings.seed.to_string());
        }
        push(&mut base, "--verbosity", settings.verbosity.to_string());
        if settings.no_refine {
            base.push("--no_refine".into());
        }
        Ok(VinaProcess {
            program: self.program.clone(),
            base,
            receptor: vec![],
            weights: vec![],
            grid: vec![],
            write_maps: None,
            ligands: vec![],
            pending: None,
            staged: None,
            staging: tempfile::tempdir().context("Unable to create staging directory")?,
            progress,
        })
    }
}

fn push<S: Into<OsString>>(args: &mut Vec<OsString>, flag: &str, value: S) {
    args.push(flag.into());
    args.push(value.into());
}

#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Randomize,
    Search(SearchParameters),
}

pub struct VinaProcess {
    program: PathBuf,
    base: Vec<OsString>,
    receptor: Vec<OsString>,
    weights: Vec<OsString>,
    grid: Vec<OsString>,
    write_maps: Option<PathBuf>,
    ligands: Vec<OsString>,
    pending: Option<Pending>,
    staged: Option<PathBuf>,
    staging: TempDir,
    progress: ProgressCallback,
}

impl VinaProcess {
    fn arguments(&self, mode: &[OsString], out: Option<&Path>) -> Vec<OsString> {
        let mut args = self.base.clone();
        args.extend(self.receptor.iter().cloned());
        args.extend(self.weights.iter().cloned());
        args.extend(self.grid.iter().cloned());
        if let Some(prefix) = &self.write_maps {
            push(&mut args, "--write_maps", prefix);
        }
        args.extend(self.ligands.iter().cloned());
        args.extend(mode.iter().cloned());
        if let Some(out) = out {
            push(&mut args, "--out", out);
        }
        args
    }

    /// Run vina to completion, relaying its progress bar, and return what it
    /// printed on stdout.
    fn run(&mut self, mode: &[OsString], out: Option<&Path>) -> Result<String> {
        if self.ligands.is_empty() {
            bail!("No ligand set before running vina");
        }
        let args = self.arguments(mode, out);
        debug!("Run {:?} {}", self.program, self::display(&args));
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to start vina from {:?}", self.program))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Unable to capture vina output"))?;

        let mut bar = ProgressBar::default();
        let mut output = vec![];
        let mut buffer = [0u8; 4096];
        loop {
            let read = stdout
                .read(&mut buffer)
                .context("Unable to read vina output")?;
            if read == 0 {
                break;
            }
            output.extend_from_slice(&buffer[..read]);
            if let Some(fraction) = bar.feed(&buffer[..read]) {
                (self.progress)(fraction);
            }
        }
        let status = child.wait().context("Unable to wait for vina")?;
        if !status.success() {
            bail!("vina exited with {}", status);
        }
        (self.progress)(1.);
        Ok(String::from_utf8_lossy(&output).to_string())
    }

    fn run_for_energies(&mut self, mode: &[OsString], out: Option<&Path>) -> Result<Vec<f64>> {
        let output = self.run(mode, out)?;
        let energies = parse_energies(&output);
        if energies.is_empty() {
            bail!("No energy found in vina output");
        }
        Ok(energies)
    }
}

fn flag(flag: &str) -> Vec<OsString> {
    vec![flag.into()]
}

fn path_arg(flag: &str, path: &Path) -> Vec<OsString> {
    vec![flag.into(), path.as_os_str().to_os_string()]
}

impl DockingEngine for VinaProcess {
    fn set_receptor(&mut self, receptor: Option<&Path>, flex: Option<&Path>) -> Result<()> {
        self.receptor.clear();
        if let Some(receptor) = receptor {
            self.receptor.extend(path_arg("--receptor", receptor));
        }
        if let Some(flex) = flex {
            self.receptor.extend(path_arg("--flex", flex));
        }
        Ok(())
    }

    fn set_weights(&mut self, weights: WeightSet) -> Result<()> {
        let (pairs, glue): (Vec<(&str, f64)>, f64) = match weights {
            WeightSet::Vina { weights, glue } => (
                vec![
                    ("--weight_gauss1", weights.gauss1),
                    ("--weight_gauss2", weights.gauss2),
                    ("--weight_repulsion", weights.repulsion),
                    ("--weight_hydrophobic", weights.hydrophobic),
                    ("--weight_hydrogen", weights.hydrogen),
                    ("--weight_rot", weights.rot),
                ],
                glue,
            ),
            WeightSet::Vinardo { weights, glue } => (
                vec![
                    ("--weight_vinardo_gauss1", weights.gauss1),
                    ("--weight_vinardo_repulsion", weights.repulsion),
                    ("--weight_vinardo_hydrophobic", weights.hydrophobic),
                    ("--weight_vinardo_hydrogen", weights.hydrogen),
                    ("--weight_rot", weights.rot),
                ],
                glue,
            ),
            WeightSet::Ad4 { weights, glue } => (
                vec![
                    ("--weight_ad4_vdw", weights.vdw),
                    ("--weight_ad4_hb", weights.hb),
                    ("--weight_ad4_elec", weights.elec),
                    ("--weight_ad4_dsolv", weights.dsolv),
                    ("--weight_ad4_rot", weights.rot),
                ],
                glue,
            ),
        };
        self.weights.clear();
        for (name, value) in pairs.into_iter().chain([("--weight_glue", glue)]) {
            push(&mut self.weights, name, value.to_string());
        }
        Ok(())
    }

    fn load_maps(&mut self, maps: &Path) -> Result<()> {
        self.grid = path_arg("--maps", maps);
        Ok(())
    }

    fn compute_vina_maps(
        &mut self,
        center: Vector3<f64>,
        size: Vector3<f64>,
        spacing: f64,
        force_even_voxels: bool,
    ) -> Result<()> {
        self.grid.clear();
        for (axis, value) in ["x", "y", "z"].iter().zip(center.iter()) {
            push(&mut self.grid, &format!("--center_{}", axis), value.to_string());
        }
        for (axis, value) in ["x", "y", "z"].iter().zip(size.iter()) {
            push(&mut self.grid, &format!("--size_{}", axis), value.to_string());
        }
        push(&mut self.grid, "--spacing", spacing.to_string());
        if force_even_voxels {
            self.grid.push("--force_even_voxels".into());
        }
        Ok(())
    }

    fn write_maps(&mut self, prefix: &Path) -> Result<()> {
        self.write_maps = Some(prefix.to_path_buf());
        Ok(())
    }

    fn set_ligands(&mut self, ligands: &[PathBuf]) -> Result<()> {
        self.ligands = ligands
            .iter()
            .flat_map(|ligand| path_arg("--ligand", ligand))
            .collect();
        self.pending = None;
        self.staged = None;
        Ok(())
    }

    fn randomize(&mut self) -> Result<()> {
        self.pending = Some(Pending::Randomize);
        Ok(())
    }

    fn score(&mut self) -> Result<Vec<f64>> {
        self.run_for_energies(&flag("--score_only"), None)
    }

    fn optimize(&mut self) -> Result<Vec<f64>> {
        let staged = self.staging.path().join("optimized.pdbqt");
        let energies = self.run_for_energies(&flag("--local_only"), Some(staged.as_path()))?;
        self.staged = Some(staged);
        Ok(energies)
    }

    fn global_search(&mut self, parameters: &SearchParameters) -> Result<()> {
        self.pending = Some(Pending::Search(*parameters));
        Ok(())
    }

    fn write_pose(&mut self, out: &Path) -> Result<()> {
        if let Some(staged) = self.staged.take() {
            std::fs::copy(&staged, out)
                .with_context(|| format!("Unable to write pose to {:?}", out))?;
            return Ok(());
        }
        match self.pending.take() {
            Some(Pending::Randomize) => {
                self.run(&flag("--randomize_only"), Some(out))?;
                Ok(())
            }
            _ => Err(anyhow!("No pose to write, randomize or optimize first")),
        }
    }

    fn write_poses(&mut self, out: &Path, num_modes: i64, energy_range: f64) -> Result<()> {
        let Some(Pending::Search(parameters)) = self.pending.take() else {
            bail!("No docking search to write poses from");
        };
        let mut mode = vec![];
        push(&mut mode, "--exhaustiveness", parameters.exhaustiveness.to_string());
        push(&mut mode, "--num_modes", num_modes.to_string());
        push(&mut mode, "--min_rmsd", parameters.min_rmsd.to_string());
        push(&mut mode, "--energy_range", energy_range.to_string());
        if parameters.max_evals > 0 {
            push(&mut mode, "--max_evals", parameters.max_evals.to_string());
        }
        self.run(&mode, Some(out))?;
        info!("Poses written to {:?}", out);
        Ok(())
    }
}

/// Follows the `|----|` ruler vina prints and counts the stars below it.
#[derive(Debug, Default)]
struct ProgressBar {
    line: Vec<u8>,
    armed: bool,
    stars: usize,
}

impl ProgressBar {
    fn feed(&mut self, bytes: &[u8]) -> Option<f64> {
        let mut moved = false;
        for &byte in bytes {
            match byte {
                b'\n' | b'\r' => {
                    if self.line.starts_with(b"|----") {
                        self.armed = true;
                        self.stars = 0;
                    } else if self.stars > 0 {
                        self.armed = false;
                    }
                    self.line.clear();
                }
                b'*' if self.armed => {
                    self.stars += 1;
                    moved = true;
                    self.line.push(byte);
                }
                _ => self.line.push(byte),
            }
        }
        moved.then(|| self.stars.min(PROGRESS_STARS) as f64 / PROGRESS_STARS as f64)
    }
}

fn leading_value(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Total free energy first, then the numbered terms vina lists below it.
fn parse_energies(output: &str) -> Vec<f64> {
    let mut energies = vec![];
    let mut lines = output.lines();
    for line in lines.by_ref() {
        if line.starts_with("Estimated Free Energy of Binding") {
            if let Some(total) = line.split_once(':').and_then(|(_, rest)| leading_value(rest)) {
                energies.push(total);
            }
            break;
        }
    }
    for line in lines {
        let line = line.trim_start();
        if !line.starts_with('(') {
            break;
        }
        if let Some(term) = line.split_once(':').and_then(|(_, rest)| leading_value(rest)) {
            energies.push(term);
        }
    }
    energies
}

fn display(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
