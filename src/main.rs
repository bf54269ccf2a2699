//! Inkplate 2 e-paper driver for Raspberry Pi
//!
//! Drives the 104x212 black/white/red panel over SPI:
//! - Keeps B/W and red planes in one framebuffer
//! - Streams it in short, time-bounded steps from a cooperative host loop
//! - Runs the reset/init/transfer/refresh/sleep sequence without blocking

mod config;
mod display;
mod scheduler;

use clap::Parser;
use config::Config;
use display::{Inkplate2, MonotonicClock, SpiTransport};
use scheduler::Scheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "inkplate2-epaper")]
#[command(about = "Black/white/red e-paper driver for the Inkplate 2 panel")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Show test pattern and exit
    #[arg(long, conflicts_with = "clear")]
    test: bool,

    /// Clear display and exit (default)
    #[arg(long)]
    clear: bool,

    /// Override the per-step transfer time budget in milliseconds
    #[arg(long = "transfer-budget-ms")]
    transfer_budget_ms: Option<u32>,
}

/// Using current_thread runtime: the update yields between steps, so the
/// signal handler runs on the same thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_result = Config::load(&args.config);
    let mut config = match &config_result {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };
    if let Some(budget) = args.transfer_budget_ms {
        config.max_transfer_time_ms = budget;
    }

    // Initialize logging
    init_logging(args.verbose || config.verbose);

    if let Err(e) = &config_result {
        tracing::warn!("Failed to load config from {}: {}", args.config, e);
        tracing::info!("Using default configuration");
    }

    tracing::info!("Starting Inkplate 2 driver");

    let transport = SpiTransport::new(&config)?;
    let mut panel = Inkplate2::new(
        transport,
        MonotonicClock::new(),
        config.display_width,
        config.display_height,
        config.transfer_limits(),
    )?;

    if args.test {
        panel.test_pattern();
    } else {
        if !args.clear {
            tracing::debug!("No action given, defaulting to --clear");
        }
        tracing::info!("Clearing display");
        panel.clear();
    }

    let mut scheduler = Scheduler::new(&config);

    tokio::select! {
        result = scheduler.run_update(&mut panel) => {
            let iterations = result?;
            tracing::info!("Display updated in {} loop iterations", iterations);
        }
        signal = wait_for_shutdown() => {
            signal?;
            tracing::warn!("Shutdown signal received, update interrupted");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
///
/// Default level is "warn"; --verbose (or `verbose` in the config) raises it
/// to "debug". `RUST_LOG` takes precedence over both.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("inkplate2_epaper={}", level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
async fn wait_for_shutdown() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }

    Ok(())
}
