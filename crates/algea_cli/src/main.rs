use algea_core::{complexity_from_scale, AlgeaConfig};
use algea_limbic::{Regulator, RegulatorStatus};
use algea_os::{SysinfoScanner, SysinfoSensor};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Upper bound on how long a run waits for dispatched work to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "algea", author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "ALGEA_CONFIG", default_value = "algea.toml")]
    config: PathBuf,

    /// Snapshot file (overrides persistence.snapshot_path)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Do not sense or touch the host machine
    #[arg(long)]
    no_host: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offer a task to the pool
    Dispatch {
        task: String,
        /// Difficulty on a 1-10 scale
        #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=10))]
        complexity: u8,
        /// Offer the same task this many times
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
        /// Pause between repeated offers
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
    /// Print distress, temperament and worker vitals
    Status,
    /// Restore a worker's integrity and clear its load
    Repair {
        worker: String,
        #[arg(short, long, default_value_t = 50.0)]
        amount: f64,
    },
    /// Reassure the organism, raising trust
    Soothe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let config = AlgeaConfig::load_or_default(&args.config);
    let snapshot_path = args
        .snapshot
        .clone()
        .unwrap_or_else(|| config.persistence.snapshot_path.clone());

    let mut regulator = Regulator::new(&config);
    if !args.no_host {
        regulator = regulator
            .with_sensor(Arc::new(SysinfoSensor::new()))
            .with_scanner(Arc::new(SysinfoScanner::new()));
    }
    let regulator = Arc::new(regulator);

    regulator.load_snapshot(&snapshot_path).await;
    regulator.start();

    let outcome = run(&regulator, args.command).await;

    let saved = regulator.save_snapshot(&snapshot_path).await;
    regulator.shutdown().await;

    outcome?;
    saved.with_context(|| format!("Failed to save snapshot to {}", snapshot_path.display()))?;
    Ok(())
}

async fn run(regulator: &Regulator, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Dispatch {
            task,
            complexity,
            repeat,
            interval_ms,
        } => {
            let complexity = complexity_from_scale(complexity);
            for n in 0..repeat {
                if n > 0 && interval_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
                println!("{}", regulator.dispatch(&task, complexity).await);
            }
            drain(regulator).await;
            print_status(&regulator.status().await);
        }
        Command::Status => print_status(&regulator.status().await),
        Command::Repair { worker, amount } => {
            let integrity = regulator.repair(&worker, amount).await?;
            println!("Worker {} repaired, integrity {:.1}%", worker, integrity);
        }
        Command::Soothe => match regulator.soothe().await {
            Ok(shift) => println!("Trust {:.2} → {:.2}", shift.before, shift.after),
            Err(e) => println!("{}", e),
        },
    }
    Ok(())
}

/// Wait until every inbox is empty, or give up after [`DRAIN_TIMEOUT`].
async fn drain(regulator: &Regulator) {
    let waited = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while regulator.workers().iter().any(|w| w.pending() > 0) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if waited.is_err() {
        info!("Work still queued after {:?}, saving anyway", DRAIN_TIMEOUT);
    }
}

fn print_status(status: &RegulatorStatus) {
    println!(
        "Distress: {:.1}/100  Alarm: {}",
        status.aggregate_distress,
        if status.alarm { "ON" } else { "off" }
    );
    println!("{}", status.temperament.report());
    println!("Live workers: {}/{}", status.live_workers(), status.workers.len());
    for w in &status.workers {
        println!(
            "  {:<6} {:<9} integrity {:>5.1}%  load {:>5.1}",
            w.id, w.state, w.integrity, w.load
        );
    }
}
