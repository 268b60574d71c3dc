use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use triage_core::RuntimeMode;
use triage_server::{OpenCaseAccess, RouteTable, ServerConfig};
use triage_telemetry::{init_telemetry, TelemetryConfig};

/// Cyber triage case-management backend.
#[derive(Debug, Parser)]
#[command(name = "triage", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = triage_server::config::DEFAULT_PORT)]
    port: u16,

    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Origin allowed by CORS and the WebSocket handshake.
    #[arg(long, env = "FRONTEND_URL", default_value = triage_server::config::DEFAULT_FRONTEND_URL)]
    frontend_url: String,

    /// development, production or test.
    #[arg(long = "env", env = "APP_ENV", default_value = "production")]
    mode: RuntimeMode,

    #[arg(long, env = "UPLOADS_DIR", default_value = "uploads")]
    uploads_dir: PathBuf,

    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    public_dir: PathBuf,

    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Default log filter; `RUST_LOG` takes precedence when set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env never overrides variables already present in the environment.
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let telemetry = init_telemetry(TelemetryConfig {
        filter: args.log_level.clone(),
        log_dir: args.log_dir.clone(),
        ..Default::default()
    })
    .context("failed to initialize logging")?;
    tracing::debug!(dir = %telemetry.log_files().dir().display(), "log sinks opened");

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        frontend_url: args.frontend_url,
        mode: args.mode,
        uploads_dir: args.uploads_dir,
        public_dir: args.public_dir,
        ..Default::default()
    };

    // The route groups' handlers live outside this binary; until they are
    // linked in, every /api group answers 404.
    let handle = triage_server::start(config, RouteTable::new(), Arc::new(OpenCaseAccess))
        .await
        .context("failed to start server")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("Received shutdown signal");

    handle.shutdown().await;
    telemetry.flush();
    Ok(())
}
