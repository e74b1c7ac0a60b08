// Cosmic Dust - command-line runner
// Runs one batch, prints a short summary and optionally exports the results

use std::path::PathBuf;

use clap::Parser;
use cosmic_dust::config::{DEFAULT_PARTICLE_COUNT, DEFAULT_Q, DEFAULT_R_MAX, DEFAULT_R_MIN};
use cosmic_dust::{CancellationToken, PopulationParameters, ServiceConfig, Simulator};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Monte Carlo synthesis of cosmic dust entering Earth's atmosphere."
)]
struct Cli {
    /// Number of particles
    #[arg(long, env = "COSMIC_DUST_N", default_value_t = DEFAULT_PARTICLE_COUNT)]
    n: u64,

    /// Minimum radius (m)
    #[arg(long, env = "COSMIC_DUST_R_MIN", default_value_t = DEFAULT_R_MIN)]
    r_min: f64,

    /// Maximum radius (m)
    #[arg(long, env = "COSMIC_DUST_R_MAX", default_value_t = DEFAULT_R_MAX)]
    r_max: f64,

    /// Power-law exponent of dN/dr ∝ r^-q
    #[arg(long, env = "COSMIC_DUST_Q", default_value_t = DEFAULT_Q)]
    q: f64,

    #[arg(long, env = "COSMIC_DUST_SEED")]
    seed: Option<u64>,

    /// Spread generation across all cores (per-particle substreams);
    /// also enabled by COSMIC_DUST_PARALLEL
    #[arg(long)]
    parallel: bool,

    /// Write the full result table to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Print the full diagnostics report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let service = ServiceConfig::from_env()?;
    if cli.n > service.max_particles {
        anyhow::bail!(
            "--n {} exceeds the particle limit of {} (COSMIC_DUST_MAX_PARTICLES)",
            cli.n,
            service.max_particles
        );
    }
    let params = PopulationParameters {
        n: cli.n,
        r_min: cli.r_min,
        r_max: cli.r_max,
        q: cli.q,
        seed: cli.seed,
    };

    let mut simulator = Simulator::new(params.seed);
    let results = if cli.parallel || service.parallel {
        simulator.run_parallel(&params, &CancellationToken::new())?
    } else {
        simulator.run(&params)?
    };
    println!("Simulated {} particles", results.len());

    let diagnostics = simulator.summarize()?;
    println!("  Mean radius: {:.2} μm", diagnostics.size_stats.mean * 1e6);
    println!(
        "  Mean entry velocity: {:.2} km/s",
        diagnostics.v_entry_stats.mean / 1000.0
    );
    for (source, count) in &diagnostics.source_distribution {
        println!("  {:<13} {}", source, count);
    }
    println!(
        "  EM-flagged: {}  High-energy: {}",
        diagnostics.em_particles, diagnostics.high_energy_particles
    );

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    }

    if let Some(path) = cli.export {
        simulator.export_tabular(&path)?;
        println!("Exported results to {}", path.display());
    }

    Ok(())
}
