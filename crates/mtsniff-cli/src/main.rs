//! mtsniff - MTConnect agent discovery
//!
//! Sweeps the local subnets for MTConnect agents and prints every device
//! they report.

mod config;

use anyhow::{bail, Result};
use clap::Parser;
use config::OutputFormat;
use mtsniff_core::DiscoveredDevice;
use mtsniff_discovery::{RunSummary, Sniffer, SnifferEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "mtsniff")]
#[command(about = "Discover MTConnect agents on the local network")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mtsniff.toml")]
    config: PathBuf,

    /// Ping and connect timeout in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Ports to scan, e.g. 5000-5019 or 5000,5001,7878
    #[arg(short, long)]
    ports: Option<String>,

    /// Prefix length applied to interface addresses
    #[arg(long)]
    prefix: Option<u8>,

    /// Print devices as JSON lines
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Repeat the sweep every N seconds until interrupted
    #[arg(long, value_name = "SECS")]
    repeat: Option<u64>,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("mtsniff v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        println!("Wrote {}", args.config.display());
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;

    if let Some(timeout) = args.timeout {
        config.discovery.timeout_ms = timeout;
    }
    if let Some(ports) = &args.ports {
        config.discovery.ports = config::parse_port_list(ports)?;
    }
    if let Some(prefix) = args.prefix {
        config.discovery.prefix_len = prefix;
    }
    if args.json {
        config.output.format = OutputFormat::Json;
    }

    info!(
        timeout_ms = config.discovery.timeout_ms,
        ports = config.discovery.ports.len(),
        prefix = config.discovery.prefix_len,
        "Configuration loaded"
    );

    let sniffer = Sniffer::new(config.discovery.clone())?;
    let format = config.output.format;

    loop {
        run_once(&sniffer, format).await?;

        let Some(secs) = args.repeat else {
            break;
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}

/// Run one sweep, printing devices as they arrive
async fn run_once(sniffer: &Sniffer, format: OutputFormat) -> Result<()> {
    let mut rx = sniffer.subscribe();
    sniffer.start();

    let mut found = 0usize;
    loop {
        match rx.recv().await {
            Ok(SnifferEvent::DeviceFound(device)) => {
                found += 1;
                print_device(&device, format)?;
            }
            Ok(SnifferEvent::RunCompleted(summary)) => {
                print_summary(found, &summary, format)?;
                return Ok(());
            }
            Ok(SnifferEvent::RunStarted) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Output fell behind, some devices were not printed");
            }
            Err(RecvError::Closed) => bail!("Discovery stopped before the run completed"),
        }
    }
}

fn print_device(device: &DiscoveredDevice, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let mac = device
                .mac()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}  {}:{}  {}", device.name(), device.address(), device.port(), mac);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(device)?),
    }
    Ok(())
}

fn print_summary(found: usize, summary: &RunSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!(
            "Found {} device(s) in {} ms ({} hosts pinged, {} agents probed)",
            found, summary.elapsed_ms, summary.counters.sent_reachability, summary.counters.sent_probe
        ),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "devices": found, "summary": summary })
        ),
    }
    Ok(())
}
