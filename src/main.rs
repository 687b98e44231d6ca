use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use colored::*;
use tokio::net::TcpListener;
use tracing::{error, info};

use cmcd_qoe_monitor::cli::Args;
use cmcd_qoe_monitor::ingest::{BroadcastSink, Engine, SINK_CHANNEL_CAP};
use cmcd_qoe_monitor::settings::Settings;
use cmcd_qoe_monitor::web::{self, AppState};
use cmcd_qoe_monitor::{logger, Result};

fn print_banner(settings: &Settings) {
    let addr = settings.server.bind_addr();
    eprintln!("{}", "=".repeat(50).bright_blue());
    eprintln!("{}", "  CMCD QoE Monitor".bright_green().bold());
    eprintln!("{}", "=".repeat(50).bright_blue());
    eprintln!("  {}: http://{}/api", "HTTP".bright_yellow(), addr);
    eprintln!("  {}: ws://{}/ws", "WebSocket".bright_yellow(), addr);
    eprintln!(
        "  {}: every {} ms, window {} entries",
        "Evaluation".bright_yellow(),
        settings.engine.tick_interval().as_millis(),
        settings.engine.window_capacity,
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);

    let settings = args.apply(Settings::load_or_default(args.config.as_deref())?);

    let sink = BroadcastSink::new(SINK_CHANNEL_CAP);
    let engine = Engine::new(
        &settings.engine,
        settings.detection.clone(),
        Arc::new(sink.clone()),
        Instant::now(),
    );
    let (handle, engine_task) = engine.spawn();

    let listener = TcpListener::bind(settings.server.bind_addr()).await?;
    print_banner(&settings);

    let state = AppState { engine: handle.clone(), sink };
    tokio::select! {
        result = web::serve(listener, state) => {
            if let Err(e) = result {
                error!(error = %e, "server stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    handle.shutdown().await?;
    if let Err(e) = engine_task.await {
        error!(error = %e, "engine task ended abnormally");
    }
    Ok(())
}
