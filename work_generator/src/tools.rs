//! External preparation programs: ADFR's `prepare_receptor`, Meeko's
//! `mk_prepare_ligand.py` and Open Babel for protonation.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use glob::glob;
use tracing::{debug, info};

use crate::{
    directives::{PrepareLigands, PrepareReceptors},
    error::PrepareError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalTool {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ExternalTool {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            leading_args: vec![],
        }
    }

    /// Arguments placed before the generated ones, e.g. the script when the
    /// program is an interpreter.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Run to completion and check that `output` was written. There is no
    /// timeout, a hung tool stalls the generator.
    pub fn run(&self, args: &[OsString], output: &Path) -> Result<(), PrepareError> {
        debug!("Run {} {:?}", self.name(), args);
        let status = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| PrepareError::ToolStart {
                tool: self.name(),
                source,
            })?;
        if !status.success() {
            return Err(PrepareError::ToolFailed {
                tool: self.name(),
                status: status.to_string(),
            });
        }
        if !output.exists() {
            return Err(PrepareError::MissingOutput {
                tool: self.name(),
                output: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toolbox {
    pub prepare_receptor: ExternalTool,
    pub prepare_ligand: ExternalTool,
    pub obabel: ExternalTool,
}

impl Default for Toolbox {
    fn default() -> Self {
        Self {
            prepare_receptor: ExternalTool::new("prepare_receptor"),
            prepare_ligand: ExternalTool::new("mk_prepare_ligand.py"),
            obabel: ExternalTool::new("obabel"),
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "structure".to_string())
}

impl Toolbox {
    /// Convert `receptor` into `<staging>/<stem>.pdbqt`.
    pub fn prepare_receptor(
        &self,
        directive: &PrepareReceptors,
        receptor: &Path,
        staging: &Path,
    ) -> Result<PathBuf, PrepareError> {
        let output = staging.join(format!("{}.pdbqt", stem(receptor)));
        self.prepare_receptor
            .run(&directive.arguments(receptor, &output), &output)?;
        info!("Receptor {:?} prepared as {:?}", receptor, output);
        Ok(output)
    }

    /// Convert `ligand` into one PDBQT file, or one per molecule with
    /// `multimol`. With a pH set the ligand is protonated first.
    pub fn prepare_ligand(
        &self,
        directive: &PrepareLigands,
        ligand: &Path,
        staging: &Path,
    ) -> Result<Vec<PathBuf>, PrepareError> {
        let name = stem(ligand);
        let input = match directive.ph {
            Some(ph) => {
                let protonated = staging.join(format!("{}_ph.sdf", name));
                let args: Vec<OsString> = vec![
                    ligand.into(),
                    "-O".into(),
                    protonated.as_path().into(),
                    "-p".into(),
                    ph.to_string().into(),
                ];
                self.obabel.run(&args, &protonated)?;
                protonated
            }
            None => ligand.to_path_buf(),
        };

        if !directive.multimol {
            let output = staging.join(format!("{}.pdbqt", name));
            self.prepare_ligand
                .run(&directive.arguments(&input, &output), &output)?;
            info!("Ligand {:?} prepared as {:?}", ligand, output);
            return Ok(vec![output]);
        }

        let output_dir = staging.join(format!("{}_multimol", name));
        std::fs::create_dir_all(&output_dir).map_err(|source| PrepareError::Staging {
            path: output_dir.clone(),
            source,
        })?;
        self.prepare_ligand
            .run(&directive.arguments(&input, &output_dir), &output_dir)?;
        let pattern = output_dir.join("*.pdbqt");
        let mut outputs = glob(&pattern.to_string_lossy())
            .map_err(|_| PrepareError::Listing(output_dir.clone()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PrepareError::Listing(output_dir.clone()))?;
        outputs.sort();
        if outputs.is_empty() {
            return Err(PrepareError::MissingOutput {
                tool: self.prepare_ligand.name(),
                output: pattern,
            });
        }
        info!("Ligand {:?} split into {} molecules", ligand, outputs.len());
        Ok(outputs)
    }
}


#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::{fake, *};
    use crate::directives::Repair;

    #[test]
    fn receptor_is_converted_into_staging() {
        let tools = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let receptor = staging.path().join("1iep.pdb");
        fs::write(&receptor, "ATOM").unwrap();
        let directive = PrepareReceptors {
            repair: Repair::BondsHydrogens,
            ..Default::default()
        };
        let output = fake::toolbox(tools.path())
            .prepare_receptor(&directive, &receptor, staging.path())
            .unwrap();
        assert_eq!(output, staging.path().join("1iep.pdbqt"));
        assert_eq!(fs::read_to_string(&output).unwrap(), "ATOM");
        let calls = fake::calls(tools.path());
        assert_eq!(calls.len(), 1);
        assert!(calls[0].ends_with("-A bonds_hydrogens"));
    }

    #[test]
    fn ligand_is_protonated_then_split() {
        let tools = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let ligand = staging.path().join("library.sdf");
        fs::write(&ligand, "MOL").unwrap();
        let directive = PrepareLigands {
            ph: Some(7.4),
            multimol: true,
            ..Default::default()
        };
        let outputs = fake::toolbox(tools.path())
            .prepare_ligand(&directive, &ligand, staging.path())
            .unwrap();
        let dir = staging.path().join("library_multimol");
        assert_eq!(outputs, vec![dir.join("mol_1.pdbqt"), dir.join("mol_2.pdbqt")]);
        let calls = fake::calls(tools.path());
        assert!(calls[0].starts_with("obabel"));
        assert!(calls[0].ends_with("-p 7.4"));
        assert!(calls[1].contains("library_ph.sdf --multimol_outdir"));
    }

    #[test]
    fn failing_tool_is_reported() {
        let tools = tempfile::tempdir().unwrap();
        let output = tools.path().join("never.pdbqt");
        let result = fake::failing(tools.path()).run(&[], &output);
        assert!(matches!(result, Err(PrepareError::ToolFailed { .. })));
    }

    #[test]
    fn silent_tool_is_reported() {
        let tools = tempfile::tempdir().unwrap();
        let output = tools.path().join("never.pdbqt");
        let result = ExternalTool::new("true").run(&[], &output);
        assert!(matches!(result, Err(PrepareError::MissingOutput { .. })));
    }

    #[test]
    fn missing_program_fails_to_start() {
        let tools = tempfile::tempdir().unwrap();
        let result = ExternalTool::new(tools.path().join("absent")).run(&[], tools.path());
        assert!(matches!(result, Err(PrepareError::ToolStart { .. })));
    }
}
