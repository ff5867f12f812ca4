//! Headless driver plumbing for the Multicell simulation: CLI, config loading and the run loop.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use multicell_core::{MulticellConfig, Simulation, TickSummary};
use tracing::info;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "multicell",
    version,
    about = "Run the Multicell artificial-life simulation headless"
)]
pub struct Cli {
    /// Number of ticks to simulate.
    #[arg(long, env = "MULTICELL_TICKS", default_value_t = 1_000)]
    pub ticks: u64,

    /// JSON configuration file; missing fields keep their defaults.
    #[arg(short, long, env = "MULTICELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// RNG seed overriding the configuration.
    #[arg(long, env = "MULTICELL_SEED")]
    pub seed: Option<u64>,

    /// Grid edge length overriding the configuration.
    #[arg(long)]
    pub world_size: Option<u32>,

    /// Log a summary every N ticks (0 disables periodic reports).
    #[arg(long, default_value_t = 100)]
    pub report_every: u64,

    /// Write the final snapshot as JSON to this path.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    pub print_config: bool,
}

/// Outcome of a headless run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticks: u64,
    pub reseeds: u32,
    pub last: Option<TickSummary>,
    pub export: Option<PathBuf>,
}

/// Read a configuration file, falling back to defaults for absent fields.
pub fn load_config(path: &Path) -> Result<MulticellConfig> {
    let file = File::open(path)
        .with_context(|| format!("failed to open config file {}", path.display()))?;
    let config: MulticellConfig = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Effective configuration: file (or defaults) with CLI overrides applied, validated.
pub fn resolve_config(cli: &Cli) -> Result<MulticellConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MulticellConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    if let Some(size) = cli.world_size {
        config.world_size = size;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn log_summary(summary: &TickSummary, reseeds: u32) {
    info!(
        tick = summary.tick.0,
        cells = summary.cell_count,
        organisms = summary.organisms,
        genomes = summary.genomes,
        births = summary.births,
        deaths = summary.deaths,
        growing = summary.reproducing(),
        energy = summary.totals.energy,
        water = summary.totals.water,
        reseeds,
        "tick summary"
    );
}

/// Build, seed and drive a simulation for `cli.ticks` ticks.
pub fn run(cli: &Cli) -> Result<RunReport> {
    let config = resolve_config(cli)?;
    info!(
        world_size = config.world_size,
        seed = ?config.rng_seed,
        ticks = cli.ticks,
        "starting Multicell simulation"
    );
    let mut simulation = Simulation::new(config).context("failed to build world")?;
    let mut last = None;
    for _ in 0..cli.ticks {
        let summary = simulation.step();
        if cli.report_every > 0 && summary.tick.0 % cli.report_every == 0 {
            log_summary(&summary, simulation.reseeds());
        }
        last = Some(summary);
    }
    if let Some(summary) = &last {
        log_summary(summary, simulation.reseeds());
    }

    if let Some(path) = &cli.export {
        let file = File::create(path)
            .with_context(|| format!("failed to create export file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &simulation.export())
            .with_context(|| format!("failed to write export to {}", path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush export to {}", path.display()))?;
        info!(path = %path.display(), "exported final snapshot");
    }

    Ok(RunReport {
        ticks: cli.ticks,
        reseeds: simulation.reseeds(),
        last,
        export: cli.export.clone(),
    })
}
