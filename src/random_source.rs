// Random Source - seeded, splittable random draws
// Every stochastic step of the pipeline goes through this type so that a run
// is a pure function of (seed, parameters).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::error::{DustError, DustResult};
use crate::physics_engine::Vector3;

// =============================================================================
// RANDOM SOURCE
// =============================================================================

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
    seed: Option<u64>,
    /// Stream key; equals the seed when one was given
    key: u64,
    draws: u64,
}

impl RandomSource {
    /// Seeded sources are reproducible; unseeded ones draw their key from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let key = match seed {
            Some(s) => s,
            None => rand::thread_rng().gen::<u64>(),
        };
        Self {
            rng: ChaCha8Rng::seed_from_u64(key),
            seed,
            key,
            draws: 0,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Some(seed))
    }

    /// Independent generator for particle `index`, derived from this source's key.
    ///
    /// The ChaCha stream id selects a disjoint keystream, so substreams never
    /// overlap and do not depend on how many draws the parent has consumed.
    pub fn substream(&self, index: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(self.key);
        rng.set_stream(index);
        Self {
            rng,
            seed: self.seed,
            key: self.key,
            draws: 0,
        }
    }

    /// Child source keyed by one draw from this stream.
    ///
    /// Each call advances the parent, so successive children (and their
    /// substreams) differ, while a seeded parent still forks reproducibly.
    pub fn fork(&mut self) -> Self {
        self.draws += 1;
        let key = self.rng.gen::<u64>();
        Self {
            rng: ChaCha8Rng::seed_from_u64(key),
            seed: self.seed,
            key,
            draws: 0,
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Number of primitive draws consumed so far
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Uniform in [0, 1)
    pub fn uniform(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }

    /// Uniform in [lo, hi)
    pub fn uniform_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }

    pub fn normal(&mut self, mean: f64, std: f64) -> f64 {
        self.draws += 1;
        let z: f64 = self.rng.sample(StandardNormal);
        mean + std * z
    }

    /// Three independent standard normal components
    pub fn standard_normal_vector(&mut self) -> Vector3 {
        Vector3::new(
            self.normal(0.0, 1.0),
            self.normal(0.0, 1.0),
            self.normal(0.0, 1.0),
        )
    }

    pub fn choose<T: Copy>(&mut self, dist: &DiscreteDistribution<T>) -> T {
        let u = self.uniform();
        dist.sample(u)
    }
}

// =============================================================================
// DISCRETE DISTRIBUTION (cumulative weight table)
// =============================================================================

#[derive(Debug, Clone)]
pub struct DiscreteDistribution<T> {
    categories: Vec<T>,
    /// Normalized cumulative weights; last entry is 1.0
    cumulative: Vec<f64>,
}

impl<T: Copy> DiscreteDistribution<T> {
    /// Weights need not sum to one; they are normalized here.
    pub fn new(weights: &[(T, f64)]) -> DustResult<Self> {
        if weights.is_empty() {
            return Err(DustError::InvalidWeights("no categories".to_string()));
        }
        if let Some((_, w)) = weights.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(DustError::InvalidWeights(format!(
                "weight {} is negative or not finite",
                w
            )));
        }
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(DustError::InvalidWeights(
                "weights sum to zero".to_string(),
            ));
        }

        let mut running = 0.0;
        let mut cumulative = Vec::with_capacity(weights.len());
        for (_, w) in weights {
            running += w / total;
            cumulative.push(running);
        }
        if let Some(last) = cumulative.last_mut() {
            *last = 1.0;
        }

        Ok(Self {
            categories: weights.iter().map(|(c, _)| *c).collect(),
            cumulative,
        })
    }

    /// Map a uniform draw in [0, 1) to a category.
    pub fn sample(&self, u: f64) -> T {
        let idx = self.cumulative.partition_point(|&c| c <= u);
        self.categories[idx.min(self.categories.len() - 1)]
    }

    pub fn categories(&self) -> &[T] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl<T: Copy + PartialEq> DiscreteDistribution<T> {
    pub fn probability(&self, category: &T) -> f64 {
        self.categories
            .iter()
            .position(|c| c == category)
            .map(|i| {
                let prev = if i == 0 { 0.0 } else { self.cumulative[i - 1] };
                self.cumulative[i] - prev
            })
            .unwrap_or(0.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================
