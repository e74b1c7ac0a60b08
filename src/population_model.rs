// Population Model - static source-family and material tables

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::random_source::DiscreteDistribution;

// =============================================================================
// CATEGORIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFamily {
    Asteroidal,
    Cometary,
    Interstellar,
}

impl SourceFamily {
    pub const ALL: [SourceFamily; 3] = [
        SourceFamily::Asteroidal,
        SourceFamily::Cometary,
        SourceFamily::Interstellar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFamily::Asteroidal => "asteroidal",
            SourceFamily::Cometary => "cometary",
            SourceFamily::Interstellar => "interstellar",
        }
    }

    /// Speed range at infinity (m/s)
    pub fn velocity_range(&self) -> (f64, f64) {
        match self {
            SourceFamily::Asteroidal => (11e3, 25e3),
            SourceFamily::Cometary => (20e3, 70e3),
            SourceFamily::Interstellar => (30e3, 100e3),
        }
    }

    pub fn fraction(&self) -> f64 {
        match self {
            SourceFamily::Asteroidal => 0.5,
            SourceFamily::Cometary => 0.3,
            SourceFamily::Interstellar => 0.2,
        }
    }

    /// Material mix for grains from this family (weights, not normalized)
    pub fn material_mix(&self) -> &'static [(Material, f64)] {
        match self {
            SourceFamily::Asteroidal => &[(Material::Silicate, 0.6), (Material::IronNickel, 0.4)],
            SourceFamily::Cometary => &[(Material::Carbonaceous, 0.8), (Material::Silicate, 0.2)],
            SourceFamily::Interstellar => {
                &[(Material::Silicate, 0.5), (Material::Carbonaceous, 0.5)]
            }
        }
    }
}

impl fmt::Display for SourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Material {
    Silicate,
    Carbonaceous,
    IronNickel,
}

impl Material {
    pub const ALL: [Material; 3] = [Material::Silicate, Material::Carbonaceous, Material::IronNickel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Material::Silicate => "silicate",
            Material::Carbonaceous => "carbonaceous",
            Material::IronNickel => "iron_nickel",
        }
    }

    /// Bulk density (kg/m³)
    pub fn density(&self) -> f64 {
        match self {
            Material::Silicate => 3000.0,
            Material::Carbonaceous => 1500.0,
            Material::IronNickel => 7800.0,
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// =============================================================================
// POPULATION MODEL
// =============================================================================

/// Sampling tables assembled from the static source and material data.
#[derive(Debug, Clone)]
pub struct PopulationModel {
    sources: DiscreteDistribution<SourceFamily>,
    asteroidal_materials: DiscreteDistribution<Material>,
    cometary_materials: DiscreteDistribution<Material>,
    interstellar_materials: DiscreteDistribution<Material>,
}

impl PopulationModel {
    pub fn standard() -> Self {
        let source_weights: Vec<(SourceFamily, f64)> =
            SourceFamily::ALL.iter().map(|s| (*s, s.fraction())).collect();

        Self {
            sources: table(&source_weights),
            asteroidal_materials: table(SourceFamily::Asteroidal.material_mix()),
            cometary_materials: table(SourceFamily::Cometary.material_mix()),
            interstellar_materials: table(SourceFamily::Interstellar.material_mix()),
        }
    }

    pub fn sources(&self) -> &DiscreteDistribution<SourceFamily> {
        &self.sources
    }

    pub fn materials(&self, source: SourceFamily) -> &DiscreteDistribution<Material> {
        match source {
            SourceFamily::Asteroidal => &self.asteroidal_materials,
            SourceFamily::Cometary => &self.cometary_materials,
            SourceFamily::Interstellar => &self.interstellar_materials,
        }
    }
}

impl Default for PopulationModel {
    fn default() -> Self {
        Self::standard()
    }
}

// Static tables are non-empty with positive weights, so construction cannot fail.
fn table<T: Copy>(weights: &[(T, f64)]) -> DiscreteDistribution<T> {
    match DiscreteDistribution::new(weights) {
        Ok(dist) => dist,
        Err(e) => unreachable!("static population table rejected: {}", e),
    }
}

// =============================================================================
// TESTS
// =============================================================================
