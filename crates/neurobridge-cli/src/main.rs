//! `neurobridge-cli` – NeuroBridge entry point
//!
//! The `neurobridge` binary wires the whole stack together:
//!
//! 1. Initialises tracing (`RUST_LOG`, `NEUROBRIDGE_LOG_FORMAT`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`).
//! 2. Loads `~/.neurobridge/config.toml` (or `$NEUROBRIDGE_CONFIG`); writes a
//!    default file on first run.
//! 3. Builds the [`NeuralPipeline`], starts the cycle/status drivers and the
//!    sensor feed, and serves rosbridge clients on `bridge_addr`.
//! 4. Intercepts **Ctrl-C** to stop scheduling and exit cleanly.

mod config;

use colored::Colorize;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use neurobridge_middleware::{EventBus, Ros2Bridge};
use neurobridge_runtime::{CycleScheduler, ModelConfig, NeuralPipeline, init_tracing, spawn_sensor_feed};
use neurobridge_types::NeuralError;

fn main() -> ExitCode {
    let telemetry = init_tracing("neurobridge");
    info!(otlp_export = telemetry.is_exporting(), "tracing initialised");

    print_banner();

    let cfg = load_config();
    let addr = match cfg.bridge_socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to build Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg.to_model_config(), addr)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}: {}", "Fatal".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

async fn run(model_config: ModelConfig, addr: SocketAddr) -> Result<(), NeuralError> {
    let bus = EventBus::default();
    let pipeline = Arc::new(NeuralPipeline::new(model_config, bus.clone())?);
    println!("  Inference backend: {}", pipeline.backend().to_string().bold());

    let feed = spawn_sensor_feed(&bus, Arc::clone(&pipeline));
    let scheduler = CycleScheduler::new(Arc::clone(&pipeline)).start();
    let mut server = tokio::spawn(Ros2Bridge::new(Arc::new(bus.clone())).run_ws_server(addr));
    println!("  rosbridge WebSocket: {}", format!("ws://{addr}").bold());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || shutdown_signal.notify_one()) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let result = tokio::select! {
        _ = shutdown.notified() => {
            println!();
            println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
            Ok(())
        }
        joined = &mut server => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(NeuralError::Channel(format!("bridge task ended: {e}"))),
        },
    };

    scheduler.shutdown();
    feed.abort();
    server.abort();

    let status = pipeline.status();
    info!(
        completed = status.cycles_completed,
        skipped = status.cycles_skipped,
        failed = status.cycles_failed,
        dropped = status.ticks_dropped,
        "pipeline stopped"
    );
    if result.is_ok() {
        println!("{}", "  ✓ Exiting NeuroBridge.".green());
    }
    result
}

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            with_env(cfg)
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            with_env(config::Config::default())
        }
    }
}

fn with_env(mut cfg: config::Config) -> config::Config {
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "NeuroBridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Sensor fusion → neural inference → velocity commands");
    println!();
}
