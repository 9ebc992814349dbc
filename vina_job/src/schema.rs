//! Wire shapes of the job description.
//!
//! The same job can arrive either nested under `input`, `search_area`,
//! `output`, `advanced` and `misc`, or as one flat object holding all of
//! their keys. Both deserialize into [`Sections`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SECTION_KEYS: [&str; 5] = ["input", "search_area", "output", "advanced", "misc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaFlavor {
    #[default]
    Nested,
    Flat,
}

impl SchemaFlavor {
    /// A document holding any section key is nested, anything else is flat.
    pub fn detect(document: &Value) -> Self {
        match document.as_object() {
            Some(object) if SECTION_KEYS.iter().any(|key| object.contains_key(*key)) => {
                Self::Nested
            }
            _ => Self::Flat,
        }
    }
}

/// Some producers write a bare string where others write an array.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InputSection {
    #[serde(default, alias = "receptors", skip_serializing_if = "Option::is_none")]
    pub receptor: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flex: Option<String>,
    #[serde(default, alias = "ligand", skip_serializing_if = "Option::is_none")]
    pub ligands: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SearchAreaSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maps: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autobox: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OutputSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_maps: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AdvancedSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_refine: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_even_voxels: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub randomize_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_gauss1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_gauss2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_repulsion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_hydrophobic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_hydrogen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_rot: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_vinardo_gauss1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_vinardo_repulsion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_vinardo_hydrophobic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_vinardo_hydrogen: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_vinardo_rot: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_ad4_vdw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_ad4_hb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_ad4_elec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_ad4_dsolv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_ad4_rot: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_glue: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MiscSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exhaustiveness: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_evals: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_modes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rmsd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_range: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<i64>,
}

/// Nested form, also the common model both flavours convert into.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Sections {
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub search_area: SearchAreaSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub advanced: AdvancedSection,
    #[serde(default)]
    pub misc: MiscSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FlatSections {
    #[serde(flatten)]
    pub input: InputSection,
    #[serde(flatten)]
    pub search_area: SearchAreaSection,
    #[serde(flatten)]
    pub output: OutputSection,
    #[serde(flatten)]
    pub advanced: AdvancedSection,
    #[serde(flatten)]
    pub misc: MiscSection,
}

impl From<FlatSections> for Sections {
    fn from(flat: FlatSections) -> Self {
        Self {
            input: flat.input,
            search_area: flat.search_area,
            output: flat.output,
            advanced: flat.advanced,
            misc: flat.misc,
        }
    }
}

impl From<Sections> for FlatSections {
    fn from(sections: Sections) -> Self {
        Self {
            input: sections.input,
            search_area: sections.search_area,
            output: sections.output,
            advanced: sections.advanced,
            misc: sections.misc,
        }
    }
}

impl Sections {
    pub fn from_value(document: &Value) -> serde_json::Result<(Self, SchemaFlavor)> {
        let flavor = SchemaFlavor::detect(document);
        let sections = match flavor {
            SchemaFlavor::Nested => Sections::deserialize(document)?,
            SchemaFlavor::Flat => FlatSections::deserialize(document)?.into(),
        };
        Ok((sections, flavor))
    }

    pub fn to_value(self, flavor: SchemaFlavor) -> serde_json::Result<Value> {
        match flavor {
            SchemaFlavor::Nested => serde_json::to_value(self),
            SchemaFlavor::Flat => serde_json::to_value(FlatSections::from(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detect_flavor() {
        assert_eq!(
            SchemaFlavor::detect(&json!({"input": {"receptor": "r.pdbqt"}})),
            SchemaFlavor::Nested
        );
        assert_eq!(
            SchemaFlavor::detect(&json!({"receptor": "r.pdbqt"})),
            SchemaFlavor::Flat
        );
    }

    #[test]
    fn flat_and_nested_describe_same_sections() {
        let (nested, _) = Sections::from_value(&json!({
            "input": {"receptor": "r.pdbqt", "ligands": ["a.pdbqt"], "scoring": "vina"},
            "search_area": {"center_x": 1.5, "size_y": 20},
            "misc": {"seed": 42}
        }))
        .unwrap();
        let (flat, _) = Sections::from_value(&json!({
            "receptor": "r.pdbqt",
            "ligand": "a.pdbqt",
            "scoring": "vina",
            "center_x": 1.5,
            "size_y": 20,
            "seed": 42
        }))
        .unwrap();
        assert_eq!(nested.input.receptor, flat.input.receptor);
        assert_eq!(
            nested.input.ligands.unwrap().into_vec(),
            flat.input.ligands.unwrap().into_vec()
        );
        assert_eq!(nested.search_area, flat.search_area);
        assert_eq!(nested.misc, flat.misc);
    }

    #[test]
    fn flat_output_has_no_section_keys() {
        let mut sections = Sections::default();
        sections.output.out = Some("out.pdbqt".to_string());
        let value = sections.to_value(SchemaFlavor::Flat).unwrap();
        assert_eq!(value, json!({"out": "out.pdbqt"}));
    }
}
