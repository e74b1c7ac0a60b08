// Simulation Engine - batch Monte Carlo runs
// Owns the ordered result collection; a new run replaces it wholesale

use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::PopulationParameters;
use crate::diagnostics::{summarize, DiagnosticsReport};
use crate::error::{DustError, DustResult};
use crate::export::export_tabular;
use crate::population_model::PopulationModel;
use crate::random_source::RandomSource;
use crate::sampler::{ParticleResult, ParticleSampler, SizeDistribution};

/// Particles between progress log lines
pub const PROGRESS_INTERVAL: usize = 10_000;

/// Particles between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Upper bound on the up-front reservation for a batch; larger runs grow as they go
const INITIAL_CAPACITY_LIMIT: usize = 10 * PROGRESS_INTERVAL;

// =============================================================================
// CANCELLATION
// =============================================================================

/// Cooperative cancellation flag shared between a caller and a running batch
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// SIMULATOR
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Empty,
    HasResults,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    rng: RandomSource,
    model: PopulationModel,
    results: Vec<ParticleResult>,
}

impl Simulator {
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_model(seed, PopulationModel::standard())
    }

    pub fn with_model(seed: Option<u64>, model: PopulationModel) -> Self {
        Self {
            rng: RandomSource::new(seed),
            model,
            results: Vec::new(),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.rng.seed()
    }

    /// Draws consumed from the sequential stream so far
    pub fn draws(&self) -> u64 {
        self.rng.draws()
    }

    pub fn state(&self) -> EngineState {
        if self.results.is_empty() {
            EngineState::Empty
        } else {
            EngineState::HasResults
        }
    }

    pub fn results(&self) -> &[ParticleResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ParticleResult> {
        self.results
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    /// Generate `params.n` particles from the simulator's single random stream.
    pub fn run(&mut self, params: &PopulationParameters) -> DustResult<&[ParticleResult]> {
        self.run_with_cancel(params, &CancellationToken::new())
    }

    /// As [`Simulator::run`], stopping early when `cancel` is set.
    ///
    /// A cancelled run leaves the previous result set in place.
    pub fn run_with_cancel(
        &mut self,
        params: &PopulationParameters,
        cancel: &CancellationToken,
    ) -> DustResult<&[ParticleResult]> {
        params.validate()?;
        let n = params.particle_count();
        let sizes = SizeDistribution::from_parameters(params);
        let sampler = ParticleSampler::new(&self.model);

        log::info!(
            "Starting run: N={} r=[{:e}, {:e}] q={} seed={:?}",
            n,
            params.r_min,
            params.r_max,
            params.q,
            self.rng.seed()
        );

        let mut batch = Vec::with_capacity(n.min(INITIAL_CAPACITY_LIMIT));
        for i in 0..n {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                log::warn!("Run cancelled after {}/{} particles", i, n);
                return Err(DustError::Cancelled {
                    completed: i,
                    requested: n,
                });
            }
            batch.push(sampler.sample_one(&mut self.rng, &sizes));
            if (i + 1) % PROGRESS_INTERVAL == 0 {
                log::info!("Simulated {}/{} particles...", i + 1, n);
            }
        }

        self.results = batch;
        log::info!("Run complete: {} particles", self.results.len());
        Ok(&self.results)
    }

    /// Generate particles across the rayon pool.
    ///
    /// Each call forks a run key from the simulator's stream (one draw), and
    /// particle `i` draws from substream `i` of that key. Results are collected
    /// in index order, so output depends on the seed and the number of earlier
    /// runs, never on thread count. Consecutive calls give fresh batches. The
    /// output differs from the sequential stream of [`Simulator::run`].
    pub fn run_parallel(
        &mut self,
        params: &PopulationParameters,
        cancel: &CancellationToken,
    ) -> DustResult<&[ParticleResult]> {
        params.validate()?;
        let n = params.particle_count();
        let sizes = SizeDistribution::from_parameters(params);
        let sampler = ParticleSampler::new(&self.model);
        let run_key = self.rng.fork();
        let rng = &run_key;
        let done = AtomicUsize::new(0);

        log::info!(
            "Starting parallel run: N={} threads={} seed={:?}",
            n,
            rayon::current_num_threads(),
            rng.seed()
        );

        let batch: Option<Vec<ParticleResult>> = (0..n)
            .into_par_iter()
            .map(|i| {
                if cancel.is_cancelled() {
                    return None;
                }
                let mut stream = rng.substream(i as u64);
                let particle = sampler.sample_one(&mut stream, &sizes);
                let completed = done.fetch_add(1, Ordering::Relaxed) + 1;
                if completed % PROGRESS_INTERVAL == 0 {
                    log::info!("Simulated {}/{} particles...", completed, n);
                }
                Some(particle)
            })
            .collect();

        match batch {
            Some(batch) => {
                self.results = batch;
                log::info!("Parallel run complete: {} particles", self.results.len());
                Ok(&self.results)
            }
            None => {
                let completed = done.load(Ordering::Relaxed);
                log::warn!("Parallel run cancelled after {}/{} particles", completed, n);
                Err(DustError::Cancelled {
                    completed,
                    requested: n,
                })
            }
        }
    }

    pub fn summarize(&self) -> DustResult<DiagnosticsReport> {
        summarize(&self.results)
    }

    pub fn export_tabular(&self, path: impl AsRef<Path>) -> DustResult<()> {
        export_tabular(&self.results, path)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: u64) -> PopulationParameters {
        PopulationParameters::new(n, 1e-7, 1e-3, 3.0)
    }

    #[test]
    fn test_starts_empty() {
        let sim = Simulator::new(Some(1));
        assert_eq!(sim.state(), EngineState::Empty);
        assert!(matches!(sim.summarize(), Err(DustError::EmptyResultSet)));
    }

    #[test]
    fn test_run_produces_n_results() {
        let mut sim = Simulator::new(Some(42));
        let results = sim.run(&params(250)).unwrap();
        assert_eq!(results.len(), 250);
        assert_eq!(sim.state(), EngineState::HasResults);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Simulator::new(Some(42));
        let mut b = Simulator::new(Some(42));
        assert_eq!(a.run(&params(300)).unwrap(), b.run(&params(300)).unwrap());
    }

    #[test]
    fn test_new_run_replaces_results() {
        let mut sim = Simulator::new(Some(3));
        sim.run(&params(100)).unwrap();
        let first = sim.results().to_vec();

        sim.run(&params(40)).unwrap();
        assert_eq!(sim.results().len(), 40);
        assert_ne!(sim.results(), &first[..40]);

        sim.clear();
        assert_eq!(sim.state(), EngineState::Empty);
    }

    #[test]
    fn test_invalid_parameters_consume_no_draws() {
        let mut sim = Simulator::new(Some(9));
        assert!(matches!(
            sim.run(&params(0)),
            Err(DustError::InvalidParameter { name: "N", .. })
        ));
        assert!(matches!(
            sim.run(&PopulationParameters::new(10, 1e-4, 1e-4, 3.0)),
            Err(DustError::InvalidParameter { .. })
        ));
        assert_eq!(sim.draws(), 0);
        assert_eq!(sim.state(), EngineState::Empty);
    }

    #[test]
    fn test_cancelled_run_keeps_previous_results() {
        let mut sim = Simulator::new(Some(10));
        sim.run(&params(20)).unwrap();
        let before = sim.results().to_vec();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sim.run_with_cancel(&params(5000), &cancel).unwrap_err();
        assert!(matches!(err, DustError::Cancelled { completed: 0, requested: 5000 }));
        assert_eq!(sim.results(), &before[..]);

        assert!(matches!(
            sim.run_parallel(&params(5000), &cancel),
            Err(DustError::Cancelled { .. })
        ));
        assert_eq!(sim.results(), &before[..]);
    }

    #[test]
    fn test_parallel_run_is_deterministic_across_pools() {
        let mut a = Simulator::new(Some(77));
        let mut b = Simulator::new(Some(77));
        let cancel = CancellationToken::new();

        let first = a.run_parallel(&params(2000), &cancel).unwrap().to_vec();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(2)
            .build()
            .unwrap();
        let second = pool.install(|| b.run_parallel(&params(2000), &cancel).unwrap().to_vec());

        assert_eq!(first, second);
    }

    #[test]
    fn test_parallel_matches_per_index_substreams() {
        let mut sim = Simulator::new(Some(4));
        let results = sim
            .run_parallel(&params(16), &CancellationToken::new())
            .unwrap()
            .to_vec();

        let model = PopulationModel::standard();
        let sampler = ParticleSampler::new(&model);
        let sizes = SizeDistribution::new(1e-7, 1e-3, 3.0);
        let parent = RandomSource::seeded(4).fork();
        for (i, particle) in results.iter().enumerate() {
            let mut stream = parent.substream(i as u64);
            assert_eq!(&sampler.sample_one(&mut stream, &sizes), particle);
        }
    }

    #[test]
    fn test_repeated_parallel_runs_draw_fresh_batches() {
        let cancel = CancellationToken::new();
        for seed in [None, Some(21)] {
            let mut sim = Simulator::new(seed);
            let first = sim.run_parallel(&params(50), &cancel).unwrap().to_vec();
            let second = sim.run_parallel(&params(50), &cancel).unwrap().to_vec();
            assert_ne!(first, second, "seed {:?}", seed);
            assert_eq!(sim.draws(), 2);
        }
    }

    #[test]
    fn test_oversized_batches_are_rejected_without_allocating() {
        let mut sim = Simulator::new(Some(1));
        let huge = params(u64::MAX / 4);
        assert!(matches!(
            sim.run(&huge),
            Err(DustError::InvalidParameter { name: "N", .. })
        ));
        assert!(matches!(
            sim.run_parallel(&huge, &CancellationToken::new()),
            Err(DustError::InvalidParameter { name: "N", .. })
        ));
        assert_eq!(sim.state(), EngineState::Empty);
        assert_eq!(sim.draws(), 0);
    }

    #[test]
    fn test_extreme_exponent_is_rejected_before_sampling() {
        let mut sim = Simulator::new(Some(1));
        assert!(matches!(
            sim.run(&PopulationParameters::new(5, 1e-7, 1e-3, 1e308)),
            Err(DustError::InvalidParameter { name: "q", .. })
        ));
        assert_eq!(sim.draws(), 0);
    }

    #[test]
    fn test_independent_simulators_coexist() {
        let mut a = Simulator::new(Some(1));
        let mut b = Simulator::new(Some(2));
        a.run(&params(10)).unwrap();
        b.run(&params(20)).unwrap();
        assert_eq!(a.results().len(), 10);
        assert_eq!(b.results().len(), 20);
    }
}
