use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fortidash_throttle::client::InventoryClient;
use fortidash_throttle::config::ThrottleConfig;
use fortidash_throttle::loadtest::{self, LoadTestPlan};
use fortidash_throttle::ratelimit::{LimiterKind, RateLimiters};

/// Load test the Fortinet inventory API through the client-side rate limiter.
#[derive(Parser, Debug)]
#[command(name = "fortidash-loadtest", version, about)]
struct Args {
    /// Base URL of the inventory API (overrides configuration)
    #[arg(short, long)]
    target: Option<String>,

    /// Maximum requests in flight
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Total number of requests
    #[arg(short = 'n', long, default_value_t = 1000)]
    requests: usize,

    /// Limiter to throttle through (api, search, bulk)
    #[arg(short, long, default_value = "api")]
    policy: LimiterKind,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the initial health check
    #[arg(long)]
    skip_health_check: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ThrottleConfig::load(args.config.as_deref())?;
    if let Some(target) = args.target {
        config.api.base_url = target;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Fortidash load test");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(base_url = %config.api.base_url, policy = %args.policy, "Configuration loaded");

    let limiters = Arc::new(RateLimiters::new(&config.policies));
    let client = InventoryClient::new(&config.api, limiters)?;

    if !args.skip_health_check {
        info!("Performing health check");
        if !client.health().await? {
            bail!("health check failed, {} is not responding", config.api.base_url);
        }
        info!("Health check passed");
    }

    let plan = LoadTestPlan {
        requests: args.requests,
        concurrency: args.concurrency,
        kind: args.policy,
        ..LoadTestPlan::default()
    };

    tokio::select! {
        summary = loadtest::run(&client, &plan) => {
            info!(
                total = summary.total(),
                succeeded = summary.succeeded,
                rate_limited = summary.rate_limited,
                failed = summary.failed,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                requests_per_second = summary.requests_per_second(),
                p50_ms = summary.latency_percentile(50.0).map(|d| d.as_millis() as u64).unwrap_or(0),
                p99_ms = summary.latency_percentile(99.0).map(|d| d.as_millis() as u64).unwrap_or(0),
                "Load test completed"
            );
            if summary.failed > 0 {
                bail!("{} of {} requests failed", summary.failed, summary.total());
            }
        }
        _ = shutdown_signal() => {
            warn!("Load test interrupted");
        }
    }

    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping load test");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping load test");
        }
    }
}
