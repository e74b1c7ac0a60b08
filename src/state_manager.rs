// State Manager - session-keyed simulation state and command handlers
// Each caller session owns its own simulator; handlers take the state by
// reference instead of reaching for a process-wide instance.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{PopulationParameters, ServiceConfig};
use crate::diagnostics::DiagnosticsReport;
use crate::error::DustError;
use crate::export::write_tabular;
use crate::population_model::{Material, SourceFamily};
use crate::sampler::ParticleResult;
use crate::simulation::{CancellationToken, Simulator};

/// Sampling key used for response subsets when the request carries no seed
pub const DEFAULT_RESPONSE_SEED: u64 = 42;

pub const EXPORT_FILE_NAME: &str = "cosmic_dust_results.csv";

// =============================================================================
// SESSION STATE
// =============================================================================

pub struct Session {
    pub simulator: Option<Simulator>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Session {
    fn new() -> Self {
        Self {
            simulator: None,
            last_run_at: None,
        }
    }

    fn completed_run(&self) -> Result<&Simulator, ApiError> {
        self.simulator
            .as_ref()
            .filter(|sim| !sim.results().is_empty())
            .ok_or_else(|| ApiError::from(DustError::EmptyResultSet))
    }
}

pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub config: ServiceConfig,
}

impl AppState {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// State configured from the environment (and `.env`, if present)
    pub fn from_env() -> Result<Self, DustError> {
        let config = ServiceConfig::from_env()?;
        log::info!(
            "Service config: sample_limit={} timeout={:?} parallel={} max_particles={}",
            config.sample_limit,
            config.run_timeout,
            config.parallel,
            config.max_particles
        );
        Ok(Self::new(config))
    }

    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.write().insert(id.clone(), Session::new());
        log::debug!("Created session {}", id);
        id
    }

    pub fn close_session(&self, session_id: &str) -> bool {
        self.sessions.write().remove(session_id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    fn ensure_session(&self, session_id: &str) -> Result<(), ApiError> {
        if self.sessions.read().contains_key(session_id) {
            Ok(())
        } else {
            Err(ApiError::unknown_session(session_id))
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServiceConfig::default())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    /// HTTP-equivalent status code
    pub status: u16,
    pub error: String,
    pub trace: Option<String>,
}

impl ApiError {
    fn new(status: u16, error: String, trace: Option<String>) -> Self {
        Self {
            success: false,
            status,
            error,
            trace,
        }
    }

    fn unknown_session(session_id: &str) -> Self {
        Self::new(404, format!("Unknown session: {}", session_id), None)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

impl From<DustError> for ApiError {
    fn from(err: DustError) -> Self {
        match err {
            DustError::InvalidParameter { .. } | DustError::EmptyResultSet => {
                ApiError::new(400, err.to_string(), None)
            }
            DustError::Cancelled { .. } => ApiError::new(504, err.to_string(), None),
            other => ApiError::new(500, other.to_string(), Some(format!("{:?}", other))),
        }
    }
}

// =============================================================================
// SERIALIZABLE STATE FOR FRONTEND
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendParticle {
    pub source_family: SourceFamily,
    pub r: f64,
    pub m: f64,
    pub material: Material,
    pub rho: f64,
    pub v_inf: f64,
    pub v_entry: f64,
    /// Entry velocity vector (m/s), see [`ParticleResult::incoming_unit_vector`]
    pub incoming_unit_vector: [f64; 3],
    pub impact_parameter_b: f64,
    pub entry_angle: f64,
    pub lat: f64,
    pub lon: f64,
    pub em_flag: bool,
    pub high_energy_flag: bool,
    pub selected_for_atmosphere: bool,
}

impl ParticleResult {
    pub fn to_frontend(&self) -> FrontendParticle {
        FrontendParticle {
            source_family: self.source_family,
            r: self.r,
            m: self.m,
            material: self.material,
            rho: self.rho,
            v_inf: self.v_inf,
            v_entry: self.v_entry,
            incoming_unit_vector: self.incoming_unit_vector.to_array(),
            impact_parameter_b: self.impact_parameter_b,
            entry_angle: self.entry_angle,
            lat: self.lat,
            lon: self.lon,
            em_flag: self.em_flag,
            high_energy_flag: self.high_energy_flag,
            selected_for_atmosphere: self.selected_for_atmosphere,
        }
    }
}

/// Simulate request body; missing fields take the run defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulateRequest {
    #[serde(rename = "N", alias = "n")]
    pub n: i64,
    pub r_min: f64,
    pub r_max: f64,
    pub q: f64,
    pub seed: Option<u64>,
}

impl Default for SimulateRequest {
    fn default() -> Self {
        let defaults = PopulationParameters::default();
        Self {
            n: defaults.n as i64,
            r_min: defaults.r_min,
            r_max: defaults.r_max,
            q: defaults.q,
            seed: None,
        }
    }
}

impl SimulateRequest {
    /// Validated run parameters, with `N` capped at `max_particles`
    pub fn to_parameters(&self, max_particles: u64) -> Result<PopulationParameters, DustError> {
        let n = u64::try_from(self.n)
            .map_err(|_| DustError::invalid("N", format!("must be positive, got {}", self.n)))?;
        if n > max_particles {
            return Err(DustError::invalid(
                "N",
                format!("at most {} particles per request, got {}", max_particles, n),
            ));
        }
        let params = PopulationParameters {
            n,
            r_min: self.r_min,
            r_max: self.r_max,
            q: self.q,
            seed: self.seed,
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateResponse {
    pub success: bool,
    pub total_particles: usize,
    pub sampled_particles: usize,
    pub results: Vec<FrontendParticle>,
    pub diagnostics: DiagnosticsReport,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsResponse {
    pub success: bool,
    pub diagnostics: DiagnosticsReport,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: &'static str,
    pub mime_type: &'static str,
    pub contents: Vec<u8>,
}

/// Reproducible subset of at most `limit` results for inline responses.
///
/// Uses its own generator so the subset never perturbs the simulation stream.
pub fn sample_for_response(
    results: &[ParticleResult],
    limit: usize,
    seed: Option<u64>,
) -> Vec<&ParticleResult> {
    if results.len() <= limit {
        return results.iter().collect();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(DEFAULT_RESPONSE_SEED));
    index::sample(&mut rng, results.len(), limit)
        .into_iter()
        .map(|i| &results[i])
        .collect()
}

// =============================================================================
// COMMANDS
// =============================================================================

pub async fn simulate(
    state: &AppState,
    session_id: &str,
    request: SimulateRequest,
) -> Result<SimulateResponse, ApiError> {
    state.ensure_session(session_id)?;
    let params = request.to_parameters(state.config.max_particles)?;

    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let parallel = state.config.parallel;

    let handle = tokio::task::spawn_blocking(move || {
        let mut simulator = Simulator::new(params.seed);
        if parallel {
            simulator.run_parallel(&params, &worker_cancel)?;
        } else {
            simulator.run_with_cancel(&params, &worker_cancel)?;
        }
        Ok::<Simulator, DustError>(simulator)
    });

    let simulator = match tokio::time::timeout(state.config.run_timeout, handle).await {
        Ok(Ok(outcome)) => outcome?,
        Ok(Err(join_err)) => {
            return Err(ApiError::new(
                500,
                "Simulation worker failed".to_string(),
                Some(join_err.to_string()),
            ))
        }
        Err(_) => {
            cancel.cancel();
            log::warn!(
                "Session {}: run exceeded {:?}, cancelling",
                session_id,
                state.config.run_timeout
            );
            return Err(ApiError::new(
                504,
                format!("Simulation exceeded {:?}", state.config.run_timeout),
                None,
            ));
        }
    };

    let diagnostics = simulator.summarize()?;
    let results: Vec<FrontendParticle> =
        sample_for_response(simulator.results(), state.config.sample_limit, params.seed)
            .into_iter()
            .map(ParticleResult::to_frontend)
            .collect();
    let total_particles = simulator.results().len();
    let completed_at = Utc::now();

    {
        let mut sessions = state.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| ApiError::unknown_session(session_id))?;
        session.simulator = Some(simulator);
        session.last_run_at = Some(completed_at);
    }

    Ok(SimulateResponse {
        success: true,
        total_particles,
        sampled_particles: results.len(),
        results,
        diagnostics,
        completed_at,
    })
}

pub fn export_results(state: &AppState, session_id: &str) -> Result<ExportedFile, ApiError> {
    let sessions = state.sessions.read();
    let session = sessions
        .get(session_id)
        .ok_or_else(|| ApiError::unknown_session(session_id))?;
    let simulator = session.completed_run()?;

    let mut contents = Vec::new();
    write_tabular(simulator.results(), &mut contents)?;

    Ok(ExportedFile {
        file_name: EXPORT_FILE_NAME,
        mime_type: "text/csv",
        contents,
    })
}

pub fn get_diagnostics(state: &AppState, session_id: &str) -> Result<DiagnosticsResponse, ApiError> {
    let sessions = state.sessions.read();
    let session = sessions
        .get(session_id)
        .ok_or_else(|| ApiError::unknown_session(session_id))?;
    let simulator = session.completed_run()?;

    Ok(DiagnosticsResponse {
        success: true,
        diagnostics: simulator.summarize()?,
        generated_at: Utc::now(),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_PARTICLES;

    fn small_request(seed: u64) -> SimulateRequest {
        SimulateRequest {
            n: 500,
            seed: Some(seed),
            ..SimulateRequest::default()
        }
    }

    #[tokio::test]
    async fn test_simulate_then_query_session() {
        let state = AppState::default();
        let session = state.create_session();

        let response = simulate(&state, &session, small_request(42)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.total_particles, 500);
        assert_eq!(response.sampled_particles, 500);
        assert_eq!(response.diagnostics.total_particles, 500);

        let diagnostics = get_diagnostics(&state, &session).unwrap();
        assert_eq!(diagnostics.diagnostics, response.diagnostics);

        let file = export_results(&state, &session).unwrap();
        assert_eq!(file.file_name, "cosmic_dust_results.csv");
        let text = String::from_utf8(file.contents).unwrap();
        assert_eq!(text.lines().count(), 501);
    }

    #[tokio::test]
    async fn test_response_sample_is_capped_and_reproducible() {
        let config = ServiceConfig {
            sample_limit: 50,
            ..ServiceConfig::default()
        };
        let state = AppState::new(config);
        let a = state.create_session();
        let b = state.create_session();

        let first = simulate(&state, &a, small_request(7)).await.unwrap();
        let second = simulate(&state, &b, small_request(7)).await.unwrap();

        assert_eq!(first.total_particles, 500);
        assert_eq!(first.sampled_particles, 50);
        let lats = |r: &SimulateResponse| r.results.iter().map(|p| p.lat).collect::<Vec<_>>();
        assert_eq!(lats(&first), lats(&second));
    }

    #[tokio::test]
    async fn test_invalid_request_is_client_error() {
        let state = AppState::default();
        let session = state.create_session();
        let request = SimulateRequest {
            n: -5,
            ..SimulateRequest::default()
        };
        let err = simulate(&state, &session, request).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.error.contains("N"));
    }

    #[tokio::test]
    async fn test_oversized_request_is_rejected() {
        let config = ServiceConfig {
            max_particles: 1000,
            ..ServiceConfig::default()
        };
        let state = AppState::new(config);
        let session = state.create_session();

        for n in [1001, i64::MAX] {
            let request = SimulateRequest {
                n,
                ..SimulateRequest::default()
            };
            let err = simulate(&state, &session, request).await.unwrap_err();
            assert_eq!(err.status, 400);
            assert!(err.error.contains("`N`"), "{}", err.error);
        }
        assert!(get_diagnostics(&state, &session).is_err());
    }

    #[test]
    fn test_malformed_table_is_server_error() {
        let err = ApiError::from(DustError::Schema("unexpected CSV header".to_string()));
        assert_eq!(err.status, 500);
        assert!(err.error.starts_with("Malformed result table"));
    }

    #[test]
    fn test_queries_before_run_fail() {
        let state = AppState::default();
        let session = state.create_session();

        let err = get_diagnostics(&state, &session).unwrap_err();
        assert_eq!(err.status, 400);
        assert!(export_results(&state, &session).unwrap_err().is_client_error());

        assert_eq!(get_diagnostics(&state, "missing").unwrap_err().status, 404);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let state = AppState::default();
        let a = state.create_session();
        let b = state.create_session();

        simulate(&state, &a, small_request(1)).await.unwrap();
        assert!(get_diagnostics(&state, &a).is_ok());
        assert!(get_diagnostics(&state, &b).is_err());

        assert!(state.close_session(&a));
        assert_eq!(state.session_count(), 1);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: SimulateRequest = serde_json::from_str(r#"{"seed": 3}"#).unwrap();
        let params = request.to_parameters(DEFAULT_MAX_PARTICLES).unwrap();
        assert_eq!(params.n, 100_000);
        assert_eq!(params.seed, Some(3));
    }

    #[test]
    fn test_state_from_env_starts_without_sessions() {
        let state = AppState::from_env().unwrap();
        assert_eq!(state.session_count(), 0);
        assert!(state.config.max_particles <= crate::config::MAX_PARTICLES);
    }

    #[test]
    fn test_unexpected_errors_carry_trace() {
        let err = ApiError::from(DustError::Config("boom".to_string()));
        assert_eq!(err.status, 500);
        assert!(err.trace.is_some());
    }
}
