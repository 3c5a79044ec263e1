//! QIOS DST Simulator CLI
//!
//! Run deterministic coordination scenarios on a virtual clock.

use clap::Parser;
use qios_core::QiosConfig;
use qios_sim::scenarios::ScenarioId;
use qios_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// QIOS Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "qios-sim")]
#[command(about = "Run deterministic simulation tests for QIOS", long_about = None)]
struct Args {
    /// Master seed for determinism
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (end_to_end, cnot_gate, measure_spam, unknown_opcode, redeclare, regeneration, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Service configuration file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "qios=debug" } else { "qios=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn summary_json(results: &[ScenarioResult], failed: usize) -> serde_json::Value {
    serde_json::json!({
        "total": results.len(),
        "passed": results.len() - failed,
        "failed": failed,
        "results": results.iter().map(|r| {
            serde_json::json!({
                "scenario": r.scenario.name(),
                "seed": r.seed,
                "passed": r.passed,
                "virtual_ms": r.virtual_ms,
                "commands": r.commands,
                "failure_reason": r.failure_reason,
            })
        }).collect::<Vec<_>>(),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("QIOS DST Simulator v{}", env!("CARGO_PKG_VERSION"));
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios:\n{}\n  all", ScenarioId::catalogue());
                std::process::exit(1);
            }
        }
    };

    let service = match &args.config {
        Some(path) => match QiosConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => QiosConfig::default(),
    };

    let runner = ScenarioRunner::new(args.seed).with_config(service);
    let mut results: Vec<ScenarioResult> = Vec::new();
    let mut failed = 0;

    for scenario in &scenarios {
        let result = runner.run(*scenario).await;

        if !args.json {
            if result.passed {
                info!(
                    "✓ {} (seed={}) PASSED in {}ms virtual: {}",
                    scenario.name(),
                    result.seed,
                    result.virtual_ms,
                    scenario.description()
                );
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if !result.passed {
            failed += 1;
        }
        results.push(result);
    }

    if args.json {
        match serde_json::to_string_pretty(&summary_json(&results, failed)) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else if failed == 0 {
        info!("All {} scenario runs passed", results.len());
    } else {
        error!("{}/{} scenario runs failed", failed, results.len());
    }

    if failed > 0 {
        std::process::exit(1);
    }
}
