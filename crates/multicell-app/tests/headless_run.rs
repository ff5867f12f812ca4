use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use clap::Parser;
use multicell_app::{Cli, load_config, run};
use multicell_core::{Tick, WorldExport};

fn scratch_path(name: &str) -> PathBuf {
    env::temp_dir().join(format!("multicell-{}-{name}", std::process::id()))
}

#[test]
fn config_file_fields_override_defaults() {
    let path = scratch_path("config.json");
    fs::write(&path, r#"{ "world_size": 20, "seeding_density": 0.2, "rng_seed": 3 }"#)
        .expect("write config");
    let config = load_config(&path).expect("load");
    assert_eq!(config.world_size, 20);
    assert_eq!(config.rng_seed, Some(3));
    assert_eq!(config.max_water, 400);
    let _ = fs::remove_file(path);
}

#[test]
fn run_writes_final_snapshot() {
    let export = scratch_path("export.json");
    let export_arg = export.to_string_lossy().into_owned();
    let cli = Cli::parse_from([
        "multicell",
        "--ticks",
        "12",
        "--seed",
        "11",
        "--world-size",
        "24",
        "--report-every",
        "0",
        "--export",
        export_arg.as_str(),
    ]);
    let report = run(&cli).expect("run");
    assert_eq!(report.ticks, 12);
    let last = report.last.expect("summary");
    assert_eq!(last.tick, Tick(12));

    let raw = fs::read_to_string(&export).expect("export written");
    let snapshot: WorldExport = serde_json::from_str(&raw).expect("snapshot json");
    assert_eq!(snapshot.tick, Tick(12));
    assert_eq!(snapshot.size, 24);
    assert_eq!(snapshot.len(), last.cell_count);
    let _ = fs::remove_file(export);
}

#[test]
fn binary_prints_effective_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_multicell"))
        .args(["--print-config", "--world-size", "33"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to run multicell binary");
    assert!(output.status.success());
    let config: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("config json on stdout");
    assert_eq!(config["world_size"], 33);
}

#[test]
fn binary_runs_headless() {
    let status = Command::new(env!("CARGO_BIN_EXE_multicell"))
        .args(["--ticks", "5", "--world-size", "16", "--seed", "2"])
        .env("RUST_LOG", "off")
        .status()
        .expect("failed to run multicell binary");
    assert!(status.success(), "headless run failed");
}
