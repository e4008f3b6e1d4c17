//! Nestwatch worker binary: registers with the launcher's registration
//! server, waits for approval, then joins the bus to probe services and
//! report back (§4.2 registration, §4.1/§6 probe contract).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lapin::{Connection, ConnectionProperties};
use nestwatch_logging::{init_logging, LogConfig};
use nestwatch_protocol::registration_api::RegisterRequest;
use nestwatch_protocol::types::WorkerLocation;
use nestwatch_worker::registration::RegistrationClient;
use nestwatch_worker::run::{run_command_consumer, run_heartbeat_loop, WorkerRuntime};
use uuid::Uuid;

/// Poll interval while waiting for an operator to approve a new worker.
const APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Give up after this many polls (~20 minutes at the default interval).
const APPROVAL_MAX_ATTEMPTS: u32 = 120;
/// How often this worker emits a signed heartbeat.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "nestwatch-worker", about = "Nestwatch probe worker")]
struct Args {
    /// Base URL of the registration server, e.g. https://nestwatch.example.com
    #[arg(long)]
    registration_url: String,

    /// Stable identifier for this worker. Generated on first run if omitted
    /// and persistence is the operator's responsibility (e.g. via env var).
    #[arg(long)]
    worker_id: Option<String>,

    /// Contact email recorded against this worker's registration.
    #[arg(long)]
    owner_email: String,

    /// Hostname reported at registration time. Defaults to the OS hostname.
    #[arg(long)]
    hostname: Option<String>,

    /// Platform string reported at registration time (e.g. "linux/x86_64").
    #[arg(long, default_value = std::env::consts::OS)]
    platform: String,

    /// Optional public key proving ownership of `worker_id` across restarts.
    #[arg(long)]
    public_key: Option<String>,

    /// Shared signing key used to sign outgoing heartbeats, if the fleet requires one.
    #[arg(long)]
    signing_key: Option<String>,

    /// Enable verbose (debug-level) console logging.
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogConfig {
        app_name: "nestwatch-worker",
        verbose: args.verbose,
        tui_mode: false,
    })
    .context("failed to initialize logging")?;

    let worker_id = args.worker_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let hostname = args
        .hostname
        .clone()
        .or_else(|| hostname_or_none())
        .unwrap_or_else(|| "unknown-host".to_string());

    let registration = RegistrationClient::new(args.registration_url.clone());
    registration
        .register(&RegisterRequest {
            worker_id: worker_id.clone(),
            hostname,
            platform: args.platform.clone(),
            ip: String::new(),
            public_key: args.public_key.clone(),
            owner_email: args.owner_email.clone(),
        })
        .await
        .context("registration request failed")?;

    tracing::info!(worker_id, "registered, waiting for operator approval");
    let status = registration
        .wait_for_approval(&worker_id, APPROVAL_POLL_INTERVAL, APPROVAL_MAX_ATTEMPTS)
        .await
        .context("worker was never approved")?;

    let rabbitmq_url = status
        .rabbitmq_url
        .context("approval response carried no broker credentials")?;
    let region = status.region.unwrap_or_else(|| "auto".to_string());

    tracing::info!(worker_id, region, "approved, connecting to broker");
    let connection = Connection::connect(&rabbitmq_url, ConnectionProperties::default())
        .await
        .context("failed to connect to rabbitmq")?;

    let runtime = Arc::new(WorkerRuntime::new(worker_id, region, args.signing_key.clone()));
    let command_channel = connection.create_channel().await?;
    let results_channel = connection.create_channel().await?;

    let location = WorkerLocation {
        continent: None,
        country: None,
        city: None,
        region: runtime.region.clone(),
    };

    tokio::try_join!(
        async { run_command_consumer(runtime.clone(), command_channel, results_channel).await.map_err(anyhow::Error::from) },
        async { run_heartbeat_loop(runtime.clone(), &connection, location, HEARTBEAT_INTERVAL).await.map_err(anyhow::Error::from) },
    )?;

    Ok(())
}

fn hostname_or_none() -> Option<String> {
    std::env::var("HOSTNAME").ok()
}
