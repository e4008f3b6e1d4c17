//! Unified launcher for the worker registration HTTP server (§4.2, §6).
//!
//! The scheduler and worker each ship their own binary with their own tick
//! or probe loop (`nestwatch-scheduler`, `nestwatch-worker`); this binary
//! owns the one HTTP surface the core exposes directly — registration and
//! status polling — since it has no tick loop of its own to run alongside.

mod registration_server;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nestwatch_fleet::registration::{RegistrationRateLimiter, RegistrationService};
use nestwatch_logging::{init_logging, LogConfig};
use nestwatch_protocol::config::SystemConfig;
use nestwatch_storage::{pool, Store};
use tracing::info;

use registration_server::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "nestwatch", about = "Nestwatch worker registration server")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used for anything it omits.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Address to bind the registration HTTP server on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Hostname (and port) advertised in issued `rabbitmqUrl`s.
    #[arg(long, default_value = "127.0.0.1")]
    broker_host: String,

    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogConfig {
        app_name: "nestwatch",
        verbose: args.verbose,
        tui_mode: false,
    })
    .context("failed to initialize logging")?;

    let config = load_config(args.config.as_deref())?;

    let backend = pool::connect(&config.redis).await;
    let store = Store::new(backend);

    let state = Arc::new(AppState {
        registration: RegistrationService::new(store.clone()),
        rate_limiter: RegistrationRateLimiter::new(
            store,
            config.registration.effective_max_per_ip_per_hour(),
        ),
        required_token: config.registration.token.clone(),
        broker_host: args.broker_host,
    });

    let app = router(state);

    info!(addr = %args.listen, "registration server listening");
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    axum::serve(listener, app)
        .await
        .context("registration server crashed")?;

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<SystemConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Ok(toml::from_str(&raw).context("parsing config file")?)
        }
        None => Ok(SystemConfig::default()),
    }
}
