//! droidlink headless client: entry point.
//!
//! ```text
//! droidlink-client                        Mirror with defaults
//! droidlink-client --config <path>        Use custom config TOML
//! droidlink-client --serial <serial>      Pick a device
//! droidlink-client --gen-config           Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use droidlink_client::config::ClientConfig;
use droidlink_client::stats::StatsSink;
use droidlink_core::{Adb, DeviceMessage, Server, Session};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "droidlink-client", about = "Headless Android screen mirroring client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "droidlink-client.toml")]
    config: PathBuf,

    /// Device serial (overrides config).
    #[arg(short, long)]
    serial: Option<String>,

    /// Local path of the server payload pushed to the device (overrides config).
    #[arg(long)]
    server_path: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", ClientConfig::default_toml()?);
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(serial) = cli.serial {
        config.adb.serial = serial;
    }
    if let Some(path) = cli.server_path {
        config.session.server_path = path;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("droidlink-client v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Start the server ─────────────────────────────────────

    let mut adb = Adb::new(&config.adb.program);
    if !config.adb.serial.is_empty() {
        adb = adb.with_serial(&config.adb.serial);
    }
    let serial = adb.get_serialno().await.unwrap_or_default();
    info!(serial = %serial, "using device");

    let mut server = Server::new(config.session.clone(), Arc::new(adb))
        .with_process_timeout(config.shutdown.process_timeout());
    let info = match server.run().await {
        Ok(info) => info,
        Err(e) => {
            if let Err(close) = server.close().await {
                warn!("server close after failed handshake: {close}");
            }
            return Err(e.into());
        }
    };
    info!(device = %info.device_name, "connected");

    // ── 2. Run the session ──────────────────────────────────────

    let (packet_tx, packet_rx) = mpsc::unbounded_channel();
    let stats = StatsSink::new(packet_rx);
    let stats_task = tokio::spawn(stats.run());

    let session = Session::start(server, vec![packet_tx], |message: DeviceMessage| match message {
        DeviceMessage::Clipboard { .. } => {
            let text = message.text().unwrap_or_default();
            info!(len = text.len(), "device clipboard changed");
        }
        DeviceMessage::AckClipboard { sequence } => {
            info!(sequence, "clipboard set acknowledged");
        }
    })?;

    if config.control.turn_screen_off {
        if let Some(controller) = session.controller() {
            match controller.turn_screen_off() {
                Ok(sent) => {
                    if let Err(e) = sent.await {
                        warn!("turn screen off: {e}");
                    }
                }
                Err(e) => warn!("turn screen off: {e}"),
            }
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = session.cancelled() => info!("session ended"),
    }

    // ── 3. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    let report = session.shutdown().await?;
    for (name, outcome) in &report.loops {
        info!(loop_name = name, %outcome, "loop");
    }
    if let Ok(stats) = stats_task.await {
        info!(
            packets = stats.total_packets,
            key_frames = stats.key_frames,
            bytes = stats.total_bytes,
            "video totals"
        );
    }

    Ok(())
}
