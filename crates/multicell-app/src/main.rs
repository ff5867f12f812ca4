use anyhow::Result;
use clap::Parser;
use multicell_app::{Cli, resolve_config, run};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    if cli.print_config {
        let config = resolve_config(&cli)?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    let report = run(&cli)?;
    info!(
        ticks = report.ticks,
        reseeds = report.reseeds,
        cells = report.last.as_ref().map_or(0, |summary| summary.cell_count),
        "simulation finished"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
