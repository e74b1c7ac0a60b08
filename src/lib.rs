// Cosmic Dust - Atmospheric Entry Monte Carlo
// Library entry point: population sampling, entry geometry, diagnostics, export
// `state_manager` is the embedding surface for hosts serving simulate, export
// and diagnostics requests; `AppState::from_env` builds it from the environment.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod physics_engine;
pub mod population_model;
pub mod random_source;
pub mod sampler;
pub mod simulation;
pub mod state_manager;

pub use config::{PopulationParameters, ServiceConfig};
pub use diagnostics::{summarize, summarize_parallel, DiagnosticsReport, Stats};
pub use error::{DustError, DustResult};
pub use export::{export_tabular, read_tabular, write_tabular, TabularRow, TABULAR_COLUMNS};
pub use physics_engine::Vector3;
pub use population_model::{Material, PopulationModel, SourceFamily};
pub use random_source::{DiscreteDistribution, RandomSource};
pub use sampler::{ParticleResult, ParticleSampler, SizeDistribution};
pub use simulation::{CancellationToken, EngineState, Simulator};
pub use state_manager::AppState;
