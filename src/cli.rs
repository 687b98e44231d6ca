use std::path::PathBuf;

use clap::Parser;

use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "cmcd-qoe-monitor")]
#[command(version)]
#[command(about = "Real-time CMCD telemetry ingestion and playback anomaly detection")]
pub struct Args {
    /// TOML settings file; every key is optional
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP / WebSocket server to
    #[arg(long)]
    pub host: Option<String>,

    /// Port for the HTTP / WebSocket server
    #[arg(long)]
    pub port: Option<u16>,

    /// Period of the rolling-window evaluation, in milliseconds
    #[arg(long = "tick-ms")]
    pub tick_ms: Option<u64>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short)]
    pub verbose: bool,
}

impl Args {
    /// Apply flags that were given on top of file or default settings.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(tick_ms) = self.tick_ms {
            settings.engine.tick_interval_ms = tick_ms;
        }
        settings
    }
}
