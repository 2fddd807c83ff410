//! Spec Sync Gateway Binary
//!
//! # Usage
//! ```bash
//! specsync-gateway [--port 5000] [--host 127.0.0.1] [--root DIR] [--config gateway.json] [--verbose]
//! ```

use anyhow::Context;
use clap::Parser;
use specsync_core::EnginePreference;
use specsync_gateway::{Gateway, GatewayConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Spec Sync Gateway - JSON API and live generation events
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Project root holding ssot/, mapping/, templates/ and output/
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Gateway configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fill engine: auto, pure or office
    #[arg(short, long)]
    engine: Option<EnginePreference>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(args.verbose)
        .init();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    config.project = config
        .project
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment configuration")?;
    if let Some(root) = args.root {
        config.project.root = root;
    }
    if let Some(engine) = args.engine {
        config.project.engine = engine;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    print_banner(&config);

    let gateway = Gateway::new(config);
    gateway.start().await?;

    Ok(())
}

fn print_banner(config: &GatewayConfig) {
    let (host, port) = (&config.host, config.port);

    println!();
    println!("Spec Sync Gateway v{}", specsync_gateway::VERSION);
    println!("─────────────────────────────────────────────");
    println!("  Project root : {}", config.project.root.display());
    println!("  Engine       : {}", config.project.engine);
    println!("  HTTP         : http://{}:{}", host, port);
    println!("  WebSocket    : ws://{}:{}/ws", host, port);
    println!();
    println!("  GET  /api/ssot            POST /api/ssot");
    println!("  GET  /api/mapping         POST /api/mapping");
    println!("  GET  /api/templates       POST /api/templates/upload");
    println!("  POST /api/generate        POST /api/validate");
    println!("  GET  /api/download/:file  GET  /api/history");
    println!("─────────────────────────────────────────────");
    println!("Press Ctrl+C to stop the gateway");
    println!();
}
