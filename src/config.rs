use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::controller::ControllerConfig;

#[derive(Debug, Parser)]
#[command(name = "cpu-stress", about = "Controllable CPU load generator", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the start/stop/status endpoints over HTTP
    Serve(ServeArgs),
    /// Run one stress test in the foreground, Ctrl-C stops it early
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Endpoints answer 403 unless this is "true" (any case)
    #[arg(long, env = "STRESS_TEST_FLAG", default_value = "")]
    pub stress_test_flag: String,

    #[command(flatten)]
    pub controller: ControllerArgs,
}

impl ServeArgs {
    pub fn stress_test_enabled(&self) -> bool {
        flag_enabled(&self.stress_test_flag)
    }
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds to run
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    pub duration: i64,

    /// Target load per core, in percent
    #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
    pub load: i64,

    #[command(flatten)]
    pub controller: ControllerArgs,
}

#[derive(Debug, Clone, Copy, Args)]
pub struct ControllerArgs {
    /// Duty cycle length in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=60_000))]
    pub cycle_ms: u64,

    /// How long stop waits for workers before detaching them, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub join_timeout_ms: u64,
}

impl From<ControllerArgs> for ControllerConfig {
    fn from(args: ControllerArgs) -> Self {
        Self {
            cycle_time: Duration::from_millis(args.cycle_ms),
            join_timeout: Duration::from_millis(args.join_timeout_ms),
        }
    }
}

/// The feature toggle is on only for a case-insensitive "true".
pub fn flag_enabled(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
