//! Trajlane Simulator CLI
//!
//! Run the data pipeline scenarios over seeded synthetic driving scenes.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trajlane_core::PadFormat;
use trajlane_sim::scenarios::ScenarioId;
use trajlane_sim::{ScenarioResult, ScenarioRunner, SimConfig};

/// Trajlane synthetic scenario CLI
#[derive(Parser, Debug)]
#[command(name = "trajlane-sim")]
#[command(about = "Run lane-query and scene-time batching scenarios on synthetic scenes", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (lane_query, scene_time, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Number of scenes to generate (overrides the config file)
    #[arg(long)]
    scenes: Option<usize>,

    /// Samples per batch for fixed-size batching
    #[arg(short, long, default_value = "8")]
    batch_size: usize,

    /// Trajectory padding layout (outside, right)
    #[arg(long, default_value = "right", value_parser = parse_pad_format)]
    pad_format: PadFormat,

    /// Stop fixed-size iteration after this many batches
    #[arg(long)]
    max_batches: Option<usize>,

    /// SimConfig JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn parse_pad_format(s: &str) -> Result<PadFormat, String> {
    match s.to_lowercase().as_str() {
        "outside" => Ok(PadFormat::Outside),
        "right" => Ok(PadFormat::Right),
        _ => Err(format!("Unknown pad format: {} (expected outside or right)", s)),
    }
}

fn load_config(args: &Args) -> anyhow::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(scenes) = args.scenes {
        config.num_scenes = scenes;
    }
    Ok(config)
}

fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the level
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("Trajlane Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: lane_query, scene_time, all");
            std::process::exit(1);
        })]
    };

    let base_config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let config = SimConfig {
            seed,
            ..base_config.clone()
        };

        let mut runner = ScenarioRunner::new(config)
            .with_batch_size(args.batch_size)
            .with_pad_format(args.pad_format);
        if let Some(max) = args.max_batches {
            runner = runner.with_max_batches(max);
        }

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED: {} batches, {} samples",
                        scenario.name(),
                        seed,
                        result.num_batches,
                        result.num_samples
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
