use std::{fmt, str::FromStr};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scoring {
    #[default]
    Vina,
    Vinardo,
    Ad4,
}

impl Scoring {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Vina => "vina",
            Self::Vinardo => "vinardo",
            Self::Ad4 => "ad4",
        }
    }

    /// AD4 only works on precomputed grid maps.
    pub fn requires_maps(&self) -> bool {
        matches!(self, Self::Ad4)
    }
}

impl FromStr for Scoring {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "vina" => Ok(Self::Vina),
            "vinardo" => Ok(Self::Vinardo),
            "ad4" => Ok(Self::Ad4),
            _ => Err(ConfigError::UnknownScoring(value.to_string())),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VinaWeights {
    pub gauss1: f64,
    pub gauss2: f64,
    pub repulsion: f64,
    pub hydrophobic: f64,
    pub hydrogen: f64,
    pub rot: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VinardoWeights {
    pub gauss1: f64,
    pub repulsion: f64,
    pub hydrophobic: f64,
    pub hydrogen: f64,
    pub rot: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ad4Weights {
    pub vdw: f64,
    pub hb: f64,
    pub elec: f64,
    pub dsolv: f64,
    pub rot: f64,
}

impl Default for VinaWeights {
    fn default() -> Self {
        Self {
            gauss1: -0.035579,
            gauss2: -0.005156,
            repulsion: 0.840245,
            hydrophobic: -0.035069,
            hydrogen: -0.587439,
            rot: 0.05846,
        }
    }
}

impl Default for VinardoWeights {
    fn default() -> Self {
        Self {
            gauss1: -0.045,
            repulsion: 0.8,
            hydrophobic: -0.035,
            hydrogen: -0.6,
            rot: 0.05846,
        }
    }
}

impl Default for Ad4Weights {
    fn default() -> Self {
        Self {
            vdw: 0.1662,
            hb: 0.1209,
            elec: 0.1406,
            dsolv: 0.1322,
            rot: 0.2983,
        }
    }
}

pub const DEFAULT_GLUE: f64 = 50.0;

/// Every weight a job may carry. Only the tuple matching the scoring
/// function is handed to the engine, see [`Weights::select`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub vina: VinaWeights,
    pub vinardo: VinardoWeights,
    pub ad4: Ad4Weights,
    pub glue: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            vina: Default::default(),
            vinardo: Default::default(),
            ad4: Default::default(),
            glue: DEFAULT_GLUE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightSet {
    Vina { weights: VinaWeights, glue: f64 },
    Vinardo { weights: VinardoWeights, glue: f64 },
    Ad4 { weights: Ad4Weights, glue: f64 },
}

impl Weights {
    pub fn select(&self, scoring: Scoring) -> WeightSet {
        let glue = self.glue;
        match scoring {
            Scoring::Vina => WeightSet::Vina {
                weights: self.vina,
                glue,
            },
            Scoring::Vinardo => WeightSet::Vinardo {
                weights: self.vinardo,
                glue,
            },
            Scoring::Ad4 => WeightSet::Ad4 {
                weights: self.ad4,
                glue,
            },
        }
    }
}
