use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::config::FloodgateConfig;
use floodgate::ratelimit::{build_limiter, build_limiter_with_clock, spawn_sweeper, ManualClock, Strategy};
use floodgate::simulation::{Pacing, Simulation};

/// Drive synthetic chat traffic through a per-user rate limiter.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Admission strategy
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Sliding window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Requests admitted per sliding window
    #[arg(long)]
    max_requests: Option<usize>,

    /// Throttle interval in milliseconds
    #[arg(long)]
    min_interval_ms: Option<u64>,

    /// Number of simulation rounds
    #[arg(long)]
    rounds: Option<u32>,

    /// Messages per round
    #[arg(long)]
    messages: Option<u32>,

    /// Number of distinct users
    #[arg(long)]
    users: Option<u32>,

    /// Advance a virtual clock instead of sleeping
    #[arg(long)]
    dry_run: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<FloodgateConfig> {
        let mut config = match &self.config {
            Some(path) => FloodgateConfig::from_file(path)?,
            None => FloodgateConfig::default(),
        };

        if let Some(strategy) = self.strategy {
            config.limiter.strategy = strategy;
        }
        if let Some(window_ms) = self.window_ms {
            config.limiter.window_ms = window_ms;
        }
        if let Some(max_requests) = self.max_requests {
            config.limiter.max_requests = max_requests;
        }
        if let Some(min_interval_ms) = self.min_interval_ms {
            config.limiter.min_interval_ms = min_interval_ms;
        }
        if let Some(rounds) = self.rounds {
            config.simulation.rounds = rounds;
        }
        if let Some(messages) = self.messages {
            config.simulation.messages_per_round = messages;
        }
        if let Some(users) = self.users {
            config.simulation.users = users;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Floodgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = cli.load_config()?;
    info!(strategy = %config.limiter.strategy, "Configuration loaded");

    let (limiter, pacing) = if cli.dry_run {
        let clock = Arc::new(ManualClock::new());
        let limiter = build_limiter_with_clock(&config.limiter, Arc::clone(&clock));
        (limiter, Pacing::Virtual(clock))
    } else {
        (build_limiter(&config.limiter), Pacing::RealTime)
    };

    let sweeper = config
        .limiter
        .sweep_interval()
        .map(|every| spawn_sweeper(Arc::clone(&limiter), every));

    let simulation = Simulation::new(limiter, config.simulation.clone(), config.round_pause())
        .with_pacing(pacing);

    let report = tokio::select! {
        report = simulation.run() => Some(report),
        _ = shutdown_signal() => None,
    };

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    match report {
        Some(report) if cli.json => println!("{}", serde_json::to_string_pretty(&report)?),
        Some(report) => info!(
            accepted = report.accepted,
            rejected = report.rejected,
            "Simulation report"
        ),
        None => warn!("Simulation interrupted before completion"),
    }

    info!("Floodgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping simulation");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping simulation");
        }
    }
}
