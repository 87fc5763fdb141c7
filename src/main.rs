use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sysinfo::System;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cpu_stress::config::{Cli, Command, RunArgs};
use cpu_stress::server::{self, AppState};
use cpu_stress::StressController;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Serve(args) => {
            let state = AppState {
                controller: Arc::new(StressController::new(args.controller.into())),
                stress_test_enabled: args.stress_test_enabled(),
            };
            server::serve(state, &args.host, args.port).await?;
        }
        Command::Run(args) => run_foreground(args).await?,
    }
    Ok(())
}

/// Runs one stress test, logging progress every second until it finishes
/// or Ctrl-C stops it.
async fn run_foreground(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let controller = Arc::new(StressController::new(args.controller.into()));
    let report = controller.start(args.duration, args.load)?;
    info!(
        workers = report.workers,
        duration = report.duration,
        load = report.load,
        "Starting CPU stress test"
    );

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = controller.status();
                if !status.running {
                    break;
                }
                sys.refresh_cpu_usage();
                info!(
                    remaining_seconds = status.remaining_seconds,
                    iterations = status.iterations,
                    cpu_usage = f64::from(sys.global_cpu_usage()),
                    "stress test progress"
                );
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for ctrl-c, stopping");
                }
                let stopping = Arc::clone(&controller);
                tokio::task::spawn_blocking(move || stopping.stop()).await?;
                break;
            }
        }
    }

    let status = controller.status();
    info!(iterations = status.iterations, "CPU stress test completed");
    Ok(())
}
