// Diagnostics - summary statistics over a completed run

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DustError, DustResult};
use crate::population_model::{Material, SourceFamily};
use crate::sampler::ParticleResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub total_particles: usize,
    pub size_stats: Stats,
    pub v_inf_stats: Stats,
    pub v_entry_stats: Stats,
    pub source_distribution: BTreeMap<SourceFamily, usize>,
    pub material_distribution: BTreeMap<Material, usize>,
    pub em_particles: usize,
    pub high_energy_particles: usize,
    pub entry_angle_stats: Stats,
    pub total_mass_kg: f64,
}

// =============================================================================
// PARTIAL REDUCTION
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Moments {
    min: f64,
    max: f64,
    sum: f64,
}

impl Moments {
    fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
        }
    }

    fn push(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    fn merge(self, other: Moments) -> Moments {
        Moments {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
        }
    }
}

/// Everything except medians, combinable across partitions
#[derive(Debug, Clone)]
struct Accumulator {
    count: usize,
    radius: Moments,
    v_inf: Moments,
    v_entry: Moments,
    entry_angle: Moments,
    sources: BTreeMap<SourceFamily, usize>,
    materials: BTreeMap<Material, usize>,
    em_particles: usize,
    high_energy_particles: usize,
    total_mass_kg: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            count: 0,
            radius: Moments::new(),
            v_inf: Moments::new(),
            v_entry: Moments::new(),
            entry_angle: Moments::new(),
            sources: BTreeMap::new(),
            materials: BTreeMap::new(),
            em_particles: 0,
            high_energy_particles: 0,
            total_mass_kg: 0.0,
        }
    }

    fn push(mut self, p: &ParticleResult) -> Self {
        self.count += 1;
        self.radius.push(p.r);
        self.v_inf.push(p.v_inf);
        self.v_entry.push(p.v_entry);
        self.entry_angle.push(p.entry_angle);
        *self.sources.entry(p.source_family).or_insert(0) += 1;
        *self.materials.entry(p.material).or_insert(0) += 1;
        self.em_particles += p.em_flag as usize;
        self.high_energy_particles += p.high_energy_flag as usize;
        self.total_mass_kg += p.m;
        self
    }

    fn merge(mut self, other: Accumulator) -> Self {
        self.count += other.count;
        self.radius = self.radius.merge(other.radius);
        self.v_inf = self.v_inf.merge(other.v_inf);
        self.v_entry = self.v_entry.merge(other.v_entry);
        self.entry_angle = self.entry_angle.merge(other.entry_angle);
        for (k, v) in other.sources {
            *self.sources.entry(k).or_insert(0) += v;
        }
        for (k, v) in other.materials {
            *self.materials.entry(k).or_insert(0) += v;
        }
        self.em_particles += other.em_particles;
        self.high_energy_particles += other.high_energy_particles;
        self.total_mass_kg += other.total_mass_kg;
        self
    }

    fn finish(self, medians: [f64; 4]) -> DiagnosticsReport {
        let n = self.count as f64;
        let stats = |m: Moments, median: f64| Stats {
            min: m.min,
            max: m.max,
            mean: m.sum / n,
            median,
        };
        DiagnosticsReport {
            total_particles: self.count,
            size_stats: stats(self.radius, medians[0]),
            v_inf_stats: stats(self.v_inf, medians[1]),
            v_entry_stats: stats(self.v_entry, medians[2]),
            source_distribution: self.sources,
            material_distribution: self.materials,
            em_particles: self.em_particles,
            high_energy_particles: self.high_energy_particles,
            entry_angle_stats: stats(self.entry_angle, medians[3]),
            total_mass_kg: self.total_mass_kg,
        }
    }
}

// =============================================================================
// MEDIANS
// =============================================================================

/// Median with the two middle values averaged for even lengths
pub fn median(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        Some(upper)
    } else {
        let below = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((below + upper) / 2.0)
    }
}

fn medians(results: &[ParticleResult]) -> [f64; 4] {
    let field = |f: fn(&ParticleResult) -> f64| {
        let mut values: Vec<f64> = results.iter().map(f).collect();
        median(&mut values).unwrap_or(f64::NAN)
    };
    [
        field(|p| p.r),
        field(|p| p.v_inf),
        field(|p| p.v_entry),
        field(|p| p.entry_angle),
    ]
}

// =============================================================================
// AGGREGATION
// =============================================================================

pub fn summarize(results: &[ParticleResult]) -> DustResult<DiagnosticsReport> {
    if results.is_empty() {
        return Err(DustError::EmptyResultSet);
    }
    let acc = results.iter().fold(Accumulator::new(), Accumulator::push);
    Ok(acc.finish(medians(results)))
}

/// Rayon partial-reduce variant of [`summarize`]; sums may differ in the last ulp.
pub fn summarize_parallel(results: &[ParticleResult]) -> DustResult<DiagnosticsReport> {
    if results.is_empty() {
        return Err(DustError::EmptyResultSet);
    }
    let acc = results
        .par_iter()
        .fold(Accumulator::new, Accumulator::push)
        .reduce(Accumulator::new, Accumulator::merge);

    let (m_r, (m_v_inf, (m_v_entry, m_angle))) = rayon::join(
        || medians_of(results, |p| p.r),
        || {
            rayon::join(
                || medians_of(results, |p| p.v_inf),
                || {
                    rayon::join(
                        || medians_of(results, |p| p.v_entry),
                        || medians_of(results, |p| p.entry_angle),
                    )
                },
            )
        },
    );
    Ok(acc.finish([m_r, m_v_inf, m_v_entry, m_angle]))
}

fn medians_of(results: &[ParticleResult], f: fn(&ParticleResult) -> f64) -> f64 {
    let mut values: Vec<f64> = results.par_iter().map(f).collect();
    median(&mut values).unwrap_or(f64::NAN)
}

// =============================================================================
// TESTS
// =============================================================================
