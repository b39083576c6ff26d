//! tandem telecom reference demo CLI.
//!
//! Runs one or all of the telecom scenarios with scripted participants,
//! evaluates each run, and verifies its hash-chained trace.
//!
//! Usage:
//!   cargo run -p demo -- run-all --trials 3
//!   cargo run -p demo -- airplane-mode
//!   cargo run -p demo -- data-refuel --json
//!   cargo run -p demo -- --config run.toml solo-refuel

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tandem_contracts::{
    error::{TandemError, TandemResult},
    run::SimulationRun,
};
use tandem_core::{config::RunConfig, traits::TraceWriter};
use tandem_eval::{summarize, Evaluator};
use tandem_ref_telecom::{
    run_batch,
    scenarios::{self, airplane_mode, data_refuel, solo_refuel},
    BatchPlan,
};
use tandem_trace::InMemoryTraceWriter;

// ── CLI definition ───────────────────────────────────────────────────────────

/// tandem: dual-control agent simulation, telecom reference demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "tandem telecom reference demo",
    long_about = "Runs the telecom reference scenarios: an agent and a simulated user\n\
                  share one environment, every message is hash-chained into a trace,\n\
                  and each finished run is scored against its task."
)]
struct Cli {
    /// Run budgets (TOML). Defaults to the embedded reference config.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print sealed runs and reward documents as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario as a concurrent batch.
    RunAll {
        /// Trials per task.
        #[arg(long, default_value_t = 1)]
        trials: u32,
    },
    /// Dual control: the user fixes airplane mode under guidance.
    AirplaneMode,
    /// Dual control: the agent refuels data, the user sees it return.
    DataRefuel,
    /// Solo: the agent refuels data and closes the ticket.
    SoloRefuel,
}

// ── Entry point ──────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for per-step output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> TandemResult<()> {
    let config = match &cli.config {
        Some(path) => RunConfig::from_file(path)?,
        None => scenarios::default_config()?,
    };
    let trace = InMemoryTraceWriter::new();
    let writer: Option<Arc<dyn TraceWriter>> = Some(Arc::new(trace.clone()));

    if !cli.json {
        print_banner(&config);
    }

    let runs = match cli.command {
        Command::RunAll { trials } => {
            let registry = scenarios::registry()?;
            let plan = BatchPlan {
                agent: scenarios::AGENT.to_string(),
                user: Some(scenarios::USER.to_string()),
                solo_tasks: scenarios::solo_tasks().into_iter().collect(),
                trials,
            };
            run_batch(&registry, &Evaluator::new(), &plan, &config, writer)?
        }
        Command::AirplaneMode => vec![airplane_mode::run_scenario(&config, writer)?],
        Command::DataRefuel => vec![data_refuel::run_scenario(&config, writer)?],
        Command::SoloRefuel => vec![solo_refuel::run_scenario(&config, writer)?],
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&runs).map_err(|e| TandemError::FatalError {
            reason: format!("failed to serialize runs: {e}"),
        })?;
        println!("{json}");
        return Ok(());
    }

    for run in &runs {
        print_run(run, &trace)?;
    }
    if runs.len() > 1 {
        print_summary(&runs);
    }
    println!("All selected scenarios completed.");
    Ok(())
}

// ── Reporting ────────────────────────────────────────────────────────────────

fn print_banner(config: &RunConfig) {
    println!();
    println!("tandem: dual-control agent simulation");
    println!("Telecom Reference Demo");
    println!("=====================================");
    println!();
    println!("Per step:");
    println!("  [1] The participant holding the turn drafts text or tool calls");
    println!("  [2] The draft is checked against the protocol (violations cost budget)");
    println!("  [3] Tool calls run against the shared database, results are appended");
    println!("  [4] Every appended message is written to a SHA-256 trace chain");
    println!();
    println!(
        "Budgets: max_steps={} max_errors={} seed={} max_concurrency={}",
        config.max_steps, config.max_errors, config.seed, config.max_concurrency
    );
    println!();
}

fn print_run(run: &SimulationRun, trace: &InMemoryTraceWriter) -> TandemResult<()> {
    println!("=== {} (trial {}) ===", run.task_id, run.trial);
    println!("  Mode:          {}", if run.solo { "solo" } else { "dual control" });
    println!("  Termination:   {}", run.termination_reason);
    println!("  Steps:         {} ({} protocol error(s))", run.steps, run.errors);
    println!("  Messages:      {}", run.messages.len());
    if let Some(error) = &run.error {
        println!("  Error:         {}", error);
    }

    if let Some(reward) = &run.reward {
        println!("  Reward:        {:.2}", reward.reward);
        for (component, score) in &reward.components {
            println!("    {:<14} {:.2}", component.as_str(), score);
        }
        if let Some(check) = &reward.db_check {
            for field in &check.diff {
                println!("    diff {}: expected {:?}, got {:?}", field.path, field.expected, field.actual);
            }
        }
        for note in &reward.notes {
            println!("    note: {}", note);
        }
    }

    let verified = trace.verify_integrity(&run.run_id)?;
    println!(
        "  Trace chain:   {}",
        if verified { "VERIFIED" } else { "FAILED" }
    );
    println!();
    Ok(())
}

fn print_summary(runs: &[SimulationRun]) {
    let summary = summarize(runs);
    println!("=== Summary ===");
    println!("  Runs:          {} over {} task(s)", summary.runs, summary.tasks);
    println!("  Avg reward:    {:.3}", summary.average_reward);
    println!("  Success rate:  {:.3}", summary.success_rate);
    for (k, value) in &summary.pass_hat_k {
        println!("  pass^{:<9}{:.3}", k, value);
    }
    for (reason, count) in &summary.terminations {
        println!("  {:<15}{}", reason, count);
    }
    println!();
}
