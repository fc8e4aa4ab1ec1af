//! Flowwarden - Real-Time Flow Analytics and Intrusion Detection
//!
//! Captures traffic on a network interface, tracks bidirectional flows,
//! and scores expired flows with a pre-trained classifier.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flowwarden::capture::{print_interfaces, PnetSource};
use flowwarden::config::{Config, SharedConfig};
use flowwarden::features::Scaler;
use flowwarden::inference::{load_labels, Engine};
use flowwarden::pipeline::{event_channel, spawn_logging_consumer, Pipeline};

/// Flowwarden real-time intrusion detection core
#[derive(Parser, Debug)]
#[command(name = "flowwarden")]
#[command(version)]
#[command(about = "Real-time flow analytics and ML-based intrusion detection", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/flowwarden.toml")]
    config: PathBuf,

    /// List available network interfaces
    #[arg(long)]
    list_interfaces: bool,

    /// Run in debug mode (verbose logging)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_interfaces {
        print_interfaces();
        return Ok(());
    }

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    config.validate()?;

    // Setup logging; the guard keeps the file writer alive
    let _guard = setup_logging(&config, args.debug)?;

    info!("Flowwarden starting...");
    info!("Interface: {}", config.capture.interface);
    info!("Home networks: {:?}", config.networks.home_net);

    // Detection components
    let scaler = Scaler::from_file(&config.detection.scaler_path)
        .with_context(|| "Failed to initialize scaler")?;
    let labels = load_labels(&config.detection.label_map_path)?;
    let engine = Engine::new(
        &config.detection.model_path,
        &config.detection.ort_lib_path,
        labels,
    )
    .with_context(|| "Failed to initialize inference engine")?;

    // Packet source
    let source = PnetSource::new(
        &config.capture.interface,
        config.capture.snaplen,
        config.capture.promiscuous,
        config.performance.packet_queue_size,
    )
    .with_context(|| format!("Failed to open capture on '{}'", config.capture.interface))?;

    // Event channel and the alert-logging consumer
    let (events_tx, events_rx) = event_channel(config.performance.packet_queue_size.min(1024));
    let consumer = spawn_logging_consumer(events_rx);

    // Pipeline
    let shared = SharedConfig::new(config.clone());
    let pipeline = Arc::new(Pipeline::new(&config, shared));

    // Shutdown signal
    let pipeline_shutdown = Arc::clone(&pipeline);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        pipeline_shutdown.shutdown();
    })
    .context("Failed to set Ctrl+C handler")?;

    info!("Listening on interface '{}'", config.capture.interface);
    pipeline
        .run(Box::new(source), scaler, Box::new(engine), events_tx)
        .await?;

    // All senders are gone once the pipeline returns; the consumer drains
    // and exits.
    let _ = consumer.join();

    info!("Flowwarden stopped");
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(
    config: &Config,
    debug: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = if debug {
        Level::DEBUG
    } else {
        match config.logging.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("flowwarden={}", level).parse().unwrap())
        .add_directive("ort=warn".parse().unwrap());

    let registry = tracing_subscriber::registry().with(filter);
    let json = config.logging.format == "json";

    match config.logging.output.as_str() {
        "file" | "both" => {
            let path = std::path::Path::new(&config.logging.file_path);
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "flowwarden.log".to_string());
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;

            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let to_stdout = config.logging.output == "both";
            match (json, to_stdout) {
                (true, true) => registry
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .with(fmt::layer().json())
                    .init(),
                (true, false) => registry
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .init(),
                (false, true) => registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .with(fmt::layer().with_target(true))
                    .init(),
                (false, false) => registry
                    .with(fmt::layer().with_writer(writer).with_ansi(false))
                    .init(),
            }
            Ok(Some(guard))
        }
        _ => {
            if json {
                registry.with(fmt::layer().json()).init();
            } else {
                registry.with(fmt::layer().with_target(true)).init();
            }
            Ok(None)
        }
    }
}
