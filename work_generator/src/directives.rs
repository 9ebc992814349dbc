//! `prepare_receptors` and `prepare_ligands`: optional blocks of a work
//! generator document asking for structures to be converted to PDBQT
//! before they are packaged.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use serde_json::Value;
use vina_job::{config::resolve_all, schema::OneOrMany};

use crate::error::PrepareError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Repair {
    BondsHydrogens,
    Bonds,
    Hydrogens,
    CheckHydrogens,
    #[default]
    None,
}

impl Repair {
    fn option(&self) -> Option<&'static str> {
        match self {
            Self::BondsHydrogens => Some("bonds_hydrogens"),
            Self::Bonds => Some("bonds"),
            Self::Hydrogens => Some("hydrogens"),
            Self::CheckHydrogens => Some("checkhydrogens"),
            Self::None => None,
        }
    }
}

impl FromStr for Repair {
    type Err = PrepareError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "bonds_hydrogens" => Ok(Self::BondsHydrogens),
            "bonds" => Ok(Self::Bonds),
            "hydrogens" => Ok(Self::Hydrogens),
            "checkhydrogens" => Ok(Self::CheckHydrogens),
            "none" => Ok(Self::None),
            _ => Err(PrepareError::UnknownRepair(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cleanup {
    Nphs,
    Lps,
    Waters,
    NonStdRes,
    DeleteAltB,
    #[default]
    None,
}

impl Cleanup {
    fn option(&self) -> Option<&'static str> {
        match self {
            Self::Nphs => Some("nphs"),
            Self::Lps => Some("lps"),
            Self::Waters => Some("waters"),
            Self::NonStdRes => Some("nonstdres"),
            Self::DeleteAltB => Some("deleteAltB"),
            Self::None => None,
        }
    }
}

impl FromStr for Cleanup {
    type Err = PrepareError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "nphs" => Ok(Self::Nphs),
            "lps" => Ok(Self::Lps),
            "waters" => Ok(Self::Waters),
            "nonstdres" => Ok(Self::NonStdRes),
            "deletealtb" => Ok(Self::DeleteAltB),
            "none" => Ok(Self::None),
            _ => Err(PrepareError::UnknownCleanup(value.to_string())),
        }
    }
}

fn parse_directive<'de, T: Deserialize<'de>>(
    directive: &'static str,
    value: &'de Value,
) -> Result<T, PrepareError> {
    T::deserialize(value).map_err(|source| PrepareError::Json { directive, source })
}

fn check_files(files: &[PathBuf]) -> Result<(), PrepareError> {
    match files.iter().find(|file| !file.is_file()) {
        Some(missing) => Err(PrepareError::MissingFile(missing.clone())),
        None => Ok(()),
    }
}

/// Already in PDBQT, nothing for the tool to convert.
pub fn is_pdbqt(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdbqt"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReceptorsDocument {
    receptors: Option<OneOrMany>,
    repair: Option<String>,
    preserves: Vec<String>,
    cleanup: Option<String>,
    delete_nonstd_residue: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareReceptors {
    pub receptors: Vec<PathBuf>,
    pub repair: Repair,
    pub preserves: Vec<String>,
    pub cleanup: Cleanup,
    pub delete_nonstd_residue: bool,
}

impl PrepareReceptors {
    pub const KEY: &'static str = "prepare_receptors";

    pub fn from_json(value: &Value, working_directory: &Path) -> Result<Self, PrepareError> {
        let document: ReceptorsDocument = parse_directive(Self::KEY, value)?;
        Ok(Self {
            receptors: resolve_all("receptors", document.receptors, working_directory)?,
            repair: document
                .repair
                .as_deref()
                .map(str::parse::<Repair>)
                .transpose()?
                .unwrap_or_default(),
            preserves: document.preserves,
            cleanup: document
                .cleanup
                .as_deref()
                .map(str::parse::<Cleanup>)
                .transpose()?
                .unwrap_or_default(),
            delete_nonstd_residue: document.delete_nonstd_residue,
        })
    }

    pub fn validate(&self) -> Result<(), PrepareError> {
        check_files(&self.receptors)
    }

    pub fn has_data(&self) -> bool {
        !self.receptors.is_empty() || self.options_requested()
    }

    pub fn options_requested(&self) -> bool {
        self.repair != Repair::None
            || !self.preserves.is_empty()
            || self.cleanup != Cleanup::None
            || self.delete_nonstd_residue
    }

    /// `prepare_receptor` command line, one flag per set option.
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-r".into(),
            input.into(),
            "-o".into(),
            output.into(),
        ];
        if let Some(repair) = self.repair.option() {
            args.push("-A".into());
            args.push(repair.into());
        }
        for preserve in &self.preserves {
            args.push("-p".into());
            args.push(preserve.into());
        }
        if let Some(cleanup) = self.cleanup.option() {
            args.push("-U".into());
            args.push(cleanup.into());
        }
        if self.delete_nonstd_residue {
            args.push("-e".into());
        }
        args
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LigandsDocument {
    ligands: Option<OneOrMany>,
    ph: Option<f64>,
    rigidity_bonds_smarts: Vec<String>,
    rigidity_bonds_indices: Vec<[u32; 2]>,
    rigid_macrocycles: bool,
    keep_nonpolar_hydrogens: bool,
    hydrate: bool,
    flexible_amides: bool,
    multimol: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareLigands {
    pub ligands: Vec<PathBuf>,
    /// Protonate with Open Babel at this pH before preparing.
    pub ph: Option<f64>,
    pub rigidity_bonds_smarts: Vec<String>,
    pub rigidity_bonds_indices: Vec<[u32; 2]>,
    pub rigid_macrocycles: bool,
    pub keep_nonpolar_hydrogens: bool,
    pub hydrate: bool,
    pub flexible_amides: bool,
    /// Input files hold several molecules, each becomes its own ligand.
    pub multimol: bool,
}

impl PrepareLigands {
    pub const KEY: &'static str = "prepare_ligands";

    pub fn from_json(value: &Value, working_directory: &Path) -> Result<Self, PrepareError> {
        let document: LigandsDocument = parse_directive(Self::KEY, value)?;
        Ok(Self {
            ligands: resolve_all("ligands", document.ligands, working_directory)?,
            ph: document.ph,
            rigidity_bonds_smarts: document.rigidity_bonds_smarts,
            rigidity_bonds_indices: document.rigidity_bonds_indices,
            rigid_macrocycles: document.rigid_macrocycles,
            keep_nonpolar_hydrogens: document.keep_nonpolar_hydrogens,
            hydrate: document.hydrate,
            flexible_amides: document.flexible_amides,
            multimol: document.multimol,
        })
    }

    pub fn validate(&self) -> Result<(), PrepareError> {
        if self.rigidity_bonds_smarts.len() != self.rigidity_bonds_indices.len() {
            return Err(PrepareError::RigidityMismatch {
                smarts: self.rigidity_bonds_smarts.len(),
                indices: self.rigidity_bonds_indices.len(),
            });
        }
        check_files(&self.ligands)
    }

    pub fn has_data(&self) -> bool {
        !self.ligands.is_empty() || self.options_requested()
    }

    pub fn options_requested(&self) -> bool {
        self.ph.is_some()
            || !self.rigidity_bonds_smarts.is_empty()
            || self.rigid_macrocycles
            || self.keep_nonpolar_hydrogens
            || self.hydrate
            || self.flexible_amides
            || self.multimol
    }

    /// `mk_prepare_ligand.py` command line. `output` is a file, or the
    /// output directory when `multimol` is set.
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
        args.push(if self.multimol {
            "--multimol_outdir".into()
        } else {
            "-o".into()
        });
        args.push(output.into());
        for (smarts, [first, second]) in self
            .rigidity_bonds_smarts
            .iter()
            .zip(&self.rigidity_bonds_indices)
        {
            args.push("--rigidity_bond_smarts".into());
            args.push(smarts.into());
            args.push("--rigidity_bond_indices".into());
            args.push(first.to_string().into());
            args.push(second.to_string().into());
        }
        let switches = [
            (self.rigid_macrocycles, "--rigid_macrocycles"),
            (self.keep_nonpolar_hydrogens, "--keep_nonpolar_hydrogens"),
            (self.hydrate, "--hydrate"),
            (self.flexible_amides, "--flexible_amides"),
        ];
        args.extend(
            switches
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, switch)| OsString::from(switch)),
        );
        args
    }
}
