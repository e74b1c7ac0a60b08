// Particle Sampler - draws one grain's full attribute set
// Composes random draws with the population tables and the entry geometry

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::PopulationParameters;
use crate::physics_engine::{
    entry_angle, entry_speed, intersect_sphere, max_impact_parameter, sample_perpendicular,
    Vector3, R_TOP,
};
use crate::population_model::{Material, PopulationModel, SourceFamily};
use crate::random_source::RandomSource;

/// Grains smaller than this (m) are flagged for electromagnetic effects
pub const EM_RADIUS_THRESHOLD: f64 = 0.5e-6;

/// Entry speeds above this (m/s) are flagged as high energy
pub const HIGH_ENERGY_SPEED_THRESHOLD: f64 = 50e3;

// =============================================================================
// PARTICLE RESULT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleResult {
    pub source_family: SourceFamily,
    /// Radius (m)
    pub r: f64,
    /// Mass (kg)
    pub m: f64,
    pub material: Material,
    /// Density (kg/m³)
    pub rho: f64,
    /// Speed at infinity (m/s)
    pub v_inf: f64,
    /// Speed at the top of the atmosphere (m/s)
    pub v_entry: f64,
    /// Entry velocity vector (m/s), magnitude `v_entry`.
    ///
    /// Despite the name this is not a unit vector; the name is kept for
    /// compatibility with existing exports. Use [`ParticleResult::incoming_direction`]
    /// for the unit direction.
    pub incoming_unit_vector: Vector3,
    /// Impact parameter (m)
    pub impact_parameter_b: f64,
    /// Angle from local vertical (degrees)
    pub entry_angle: f64,
    pub lat: f64,
    pub lon: f64,
    pub em_flag: bool,
    pub high_energy_flag: bool,
    pub selected_for_atmosphere: bool,
}

impl ParticleResult {
    /// Unit vector along the entry velocity
    pub fn incoming_direction(&self) -> Vector3 {
        self.incoming_unit_vector.normalize()
    }

    pub fn max_impact_parameter(&self) -> f64 {
        max_impact_parameter(self.v_inf)
    }
}

/// Volume-equivalent sphere mass (kg)
pub fn sphere_mass(r: f64, rho: f64) -> f64 {
    (4.0 / 3.0) * PI * r.powi(3) * rho
}

// =============================================================================
// SIZE DISTRIBUTION
// =============================================================================

/// Truncated power law dN/dr ∝ r^-q on [r_min, r_max]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeDistribution {
    pub r_min: f64,
    pub r_max: f64,
    pub q: f64,
}

impl SizeDistribution {
    pub fn new(r_min: f64, r_max: f64, q: f64) -> Self {
        Self { r_min, r_max, q }
    }

    pub fn from_parameters(params: &PopulationParameters) -> Self {
        Self::new(params.r_min, params.r_max, params.q)
    }

    /// Inverse CDF evaluated in log space.
    ///
    /// For q = 1 the log-radius is uniform. Otherwise, with a = 1 - q and
    /// d = a·ln(r_max/r_min), the CDF is inverted relative to the nearer end:
    /// r^a = r_min^a·(1 + u·(e^d - 1)) or r^a = r_max^a·(1 + (1 - u)·(e^-d - 1)).
    /// `ln_1p`/`exp_m1` keep both forms accurate when q is close to 1, and the
    /// far-end form is used only when the near-end one would overflow.
    pub fn radius_at(&self, u: f64) -> f64 {
        const MAX_EXP: f64 = 700.0;

        let ln_min = self.r_min.ln();
        let ln_max = self.r_max.ln();
        let a = 1.0 - self.q;
        let d = a * (ln_max - ln_min);

        let from_min = |u: f64| ln_min + (u * d.exp_m1()).ln_1p() / a;
        let from_max = |u: f64| ln_max + ((1.0 - u) * (-d).exp_m1()).ln_1p() / a;

        let ln_r = if a == 0.0 || d == 0.0 {
            ln_min + (ln_max - ln_min) * u
        } else if d > MAX_EXP {
            from_max(u)
        } else if d < -MAX_EXP || u <= 0.5 {
            from_min(u)
        } else {
            from_max(u)
        };

        let r = ln_r.exp();
        if r.is_nan() {
            return self.r_min;
        }
        r.clamp(self.r_min, self.r_max)
    }
}

// =============================================================================
// PARTICLE SAMPLER
// =============================================================================

pub struct ParticleSampler<'a> {
    model: &'a PopulationModel,
}

impl<'a> ParticleSampler<'a> {
    pub fn new(model: &'a PopulationModel) -> Self {
        Self { model }
    }

    pub fn sample_source(&self, rng: &mut RandomSource) -> SourceFamily {
        rng.choose(self.model.sources())
    }

    pub fn sample_radius(&self, rng: &mut RandomSource, sizes: &SizeDistribution) -> f64 {
        sizes.radius_at(rng.uniform())
    }

    pub fn sample_material(&self, rng: &mut RandomSource, source: SourceFamily) -> Material {
        rng.choose(self.model.materials(source))
    }

    /// Normal draw centred on the family's range, clamped into it.
    ///
    /// Clamping (not rejection) piles a few percent of the mass onto each bound.
    pub fn sample_v_inf(&self, rng: &mut RandomSource, source: SourceFamily) -> f64 {
        let (v_min, v_max) = source.velocity_range();
        let mean = (v_min + v_max) / 2.0;
        let std = (v_max - v_min) / 4.0;
        rng.normal(mean, std).clamp(v_min, v_max)
    }

    /// Incoming direction: isotropic for interstellar grains, ecliptic-biased otherwise
    pub fn sample_direction(&self, rng: &mut RandomSource, source: SourceFamily) -> Vector3 {
        match source {
            SourceFamily::Interstellar => loop {
                if let Some(u) = rng.standard_normal_vector().try_normalize() {
                    break u;
                }
            },
            SourceFamily::Asteroidal | SourceFamily::Cometary => {
                let theta = rng.uniform_range(0.0, 2.0 * PI);
                let cos_i = rng.uniform_range(0.5, 1.0);
                let sin_i = (1.0 - cos_i * cos_i).sqrt();
                let mut u = Vector3::new(sin_i * theta.cos(), sin_i * theta.sin(), cos_i);
                if rng.uniform() < 0.5 {
                    u.z = -u.z;
                }
                u.normalize()
            }
        }
    }

    pub fn sample_one(&self, rng: &mut RandomSource, sizes: &SizeDistribution) -> ParticleResult {
        let source = self.sample_source(rng);
        let r = self.sample_radius(rng, sizes);

        let material = self.sample_material(rng, source);
        let rho = material.density();
        let m = sphere_mass(r, rho);

        let v_inf = self.sample_v_inf(rng, source);
        let u = self.sample_direction(rng, source);

        // Area-preserving draw over the focused impact disk
        let b_max = max_impact_parameter(v_inf);
        let b_hat = sample_perpendicular(&u, rng);
        let b_mag = rng.uniform().sqrt() * b_max;
        let b_vec = b_hat.scale(b_mag);

        let v_entry = entry_speed(v_inf);
        let v_entry_vec = u.scale(-v_entry);

        let hit = intersect_sphere(&u, &b_vec, R_TOP, rng);
        let angle = entry_angle(&v_entry_vec, &hit.position);

        ParticleResult {
            source_family: source,
            r,
            m,
            material,
            rho,
            v_inf,
            v_entry,
            incoming_unit_vector: v_entry_vec,
            impact_parameter_b: b_mag,
            entry_angle: angle,
            lat: hit.lat,
            lon: hit.lon,
            em_flag: r < EM_RADIUS_THRESHOLD,
            high_energy_flag: v_entry > HIGH_ENERGY_SPEED_THRESHOLD,
            // No atmospheric selection cut is applied yet
            selected_for_atmosphere: true,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
