use anyhow::Result;
use clap::Parser;
use dialcast::app::{serve, AppStateBuilder};
use dialcast::config::{Cli, Config};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.conf.as_deref() {
        Some(path) if std::path::Path::new(path).exists() => Config::load(path)?,
        Some(path) => {
            let config = Config::default();
            eprintln!("config file {} not found, using defaults", path);
            config
        }
        None => Config::default(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
    });
    // Guard must outlive main or buffered log lines are dropped.
    let _appender_guard = match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    };

    let state = AppStateBuilder::new().with_config(config).build()?;
    info!(addr = state.config.http_addr, "starting dialcast");

    let shutdown = state.token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => warn!("failed to listen for shutdown signal: {}", e),
        }
    });

    serve(state).await
}
