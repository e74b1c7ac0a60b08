// Configuration - run parameters and service settings
// Run parameters arrive from callers (CLI flags, simulate requests); service
// settings come from the environment, optionally via a `.env` file.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DustError, DustResult};

pub const DEFAULT_PARTICLE_COUNT: u64 = 100_000;
pub const DEFAULT_R_MIN: f64 = 0.1e-6;
pub const DEFAULT_R_MAX: f64 = 1e-3;
pub const DEFAULT_Q: f64 = 3.0;

/// Maximum number of particles returned inline by a simulate command
pub const DEFAULT_SAMPLE_LIMIT: usize = 10_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Hard ceiling on particles per run; larger batches are rejected, not allocated
pub const MAX_PARTICLES: u64 = 10_000_000;

/// Default per-request ceiling for the command layer
pub const DEFAULT_MAX_PARTICLES: u64 = 1_000_000;

// =============================================================================
// POPULATION PARAMETERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationParameters {
    /// Number of particles to generate
    #[serde(rename = "N", alias = "n")]
    pub n: u64,
    /// Minimum radius (m)
    pub r_min: f64,
    /// Maximum radius (m)
    pub r_max: f64,
    /// Power-law exponent of dN/dr ∝ r^-q
    pub q: f64,
    pub seed: Option<u64>,
}

impl Default for PopulationParameters {
    fn default() -> Self {
        Self {
            n: DEFAULT_PARTICLE_COUNT,
            r_min: DEFAULT_R_MIN,
            r_max: DEFAULT_R_MAX,
            q: DEFAULT_Q,
            seed: None,
        }
    }
}

impl PopulationParameters {
    pub fn new(n: u64, r_min: f64, r_max: f64, q: f64) -> Self {
        Self {
            n,
            r_min,
            r_max,
            q,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject parameter sets that would make sampling degenerate.
    pub fn validate(&self) -> DustResult<()> {
        if self.n == 0 {
            return Err(DustError::invalid("N", "particle count must be positive"));
        }
        if self.n > MAX_PARTICLES {
            return Err(DustError::invalid(
                "N",
                format!("at most {} particles per run, got {}", MAX_PARTICLES, self.n),
            ));
        }
        if !self.r_min.is_finite() || self.r_min <= 0.0 {
            return Err(DustError::invalid(
                "r_min",
                format!("must be a positive finite radius, got {}", self.r_min),
            ));
        }
        if !self.r_max.is_finite() {
            return Err(DustError::invalid(
                "r_max",
                format!("must be finite, got {}", self.r_max),
            ));
        }
        if self.r_min >= self.r_max {
            return Err(DustError::invalid(
                "r_max",
                format!(
                    "r_min ({}) must be strictly less than r_max ({})",
                    self.r_min, self.r_max
                ),
            ));
        }
        if !self.q.is_finite() {
            return Err(DustError::invalid(
                "q",
                format!("power-law exponent must be finite, got {}", self.q),
            ));
        }
        let a = 1.0 - self.q;
        if !(a * self.r_min.ln()).is_finite() || !(a * self.r_max.ln()).is_finite() {
            return Err(DustError::invalid(
                "q",
                format!("power-law exponent {} is out of range for these radii", self.q),
            ));
        }
        Ok(())
    }

    pub fn particle_count(&self) -> usize {
        usize::try_from(self.n).unwrap_or(usize::MAX)
    }
}

// =============================================================================
// SERVICE CONFIGURATION
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub sample_limit: usize,
    pub run_timeout: Duration,
    pub parallel: bool,
    /// Largest `N` a single simulate request may ask for
    pub max_particles: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            run_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            parallel: false,
            max_particles: DEFAULT_MAX_PARTICLES,
        }
    }
}

impl ServiceConfig {
    /// Read settings from the process environment after loading `.env`, if any.
    pub fn from_env() -> DustResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> DustResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let sample_limit = parse_var(&lookup, "COSMIC_DUST_SAMPLE_LIMIT")?
            .unwrap_or(defaults.sample_limit);
        let timeout_secs = parse_var(&lookup, "COSMIC_DUST_TIMEOUT_SECS")?
            .unwrap_or(defaults.run_timeout.as_secs());
        let parallel = parse_var(&lookup, "COSMIC_DUST_PARALLEL")?.unwrap_or(defaults.parallel);
        let max_particles = parse_var(&lookup, "COSMIC_DUST_MAX_PARTICLES")?
            .unwrap_or(defaults.max_particles);

        if sample_limit == 0 {
            return Err(DustError::Config(
                "COSMIC_DUST_SAMPLE_LIMIT must be positive".to_string(),
            ));
        }
        if max_particles == 0 || max_particles > MAX_PARTICLES {
            return Err(DustError::Config(format!(
                "COSMIC_DUST_MAX_PARTICLES must be in 1..={}, got {}",
                MAX_PARTICLES, max_particles
            )));
        }

        Ok(Self {
            sample_limit,
            run_timeout: Duration::from_secs(timeout_secs),
            parallel,
            max_particles,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> DustResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| DustError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
