// src/main.rs

//! The main entry point for the Rampart reverse proxy.

use anyhow::Result;
use rampart::config::Config;
use rampart::server;
use std::env;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();
    if args.contains(&"--version".to_string()) {
        println!("Rampart version {VERSION}");
        return Ok(());
    }

    // A local .env file is folded into the environment before the
    // configuration snapshot is taken.
    dotenvy::dotenv().ok();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            std::process::exit(1);
        }
    };

    // Setup logging with compact format and ANSI colors; RUST_LOG wins over
    // the configured level.
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    info!("Rampart {} starting.", VERSION);
    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
