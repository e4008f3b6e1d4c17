//! Nestwatch scheduler binary: the single-threaded tick loop plus the three
//! bus-consumer tasks that feed it (§4.1, §5, §6).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use nestwatch_fleet::HeartbeatVerifier;
use nestwatch_logging::{init_logging, LogConfig};
use nestwatch_protocol::config::SystemConfig;
use nestwatch_protocol::defaults::amqp;
use nestwatch_protocol::types::{HeartbeatMessage, ProbeResultMessage, Service};
use nestwatch_scheduler::{heartbeat, ingestion, service_ops, stats, DedupCache, LapinPublisher};
use nestwatch_storage::{pool, Store};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "nestwatch-scheduler", about = "Nestwatch scheduling core")]
struct Args {
    /// Path to a TOML configuration file. Defaults are used for anything it omits.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose (debug-level) console logging.
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogConfig {
        app_name: "nestwatch-scheduler",
        verbose: args.verbose,
        tui_mode: false,
    })
    .context("failed to initialize logging")?;

    let config = load_config(args.config.as_deref())?;

    let backend = pool::connect(&config.redis).await;
    let store = Store::new(backend);

    let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
        .await
        .context("failed to connect to rabbitmq")?;

    let publish_channel = connection.create_channel().await?;
    let publisher = Arc::new(LapinPublisher::declare(publish_channel).await?);

    let dedup = Arc::new(DedupCache::new(config.scheduler.dedup_ttl_sec));
    let verifier = Arc::new(HeartbeatVerifier::new(store.clone(), false));

    tokio::try_join!(
        run_tick_loop(store.clone(), dedup.clone(), publisher.clone(), config.scheduler.tick_ms),
        run_heartbeat_consumer(store.clone(), verifier.clone(), connection.create_channel().await?),
        run_heartbeat_janitor(store.clone(), config.worker.heartbeat_timeout_ms),
        run_result_consumer(store.clone(), connection.create_channel().await?),
        run_command_consumer(store.clone(), connection.create_channel().await?),
    )?;

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

/// The non-overlapping tick loop (§5): each iteration awaits the previous
/// tick's storage/publish work to finish before sleeping for the next one.
async fn run_tick_loop(
    store: Store,
    dedup: Arc<DedupCache>,
    publisher: Arc<LapinPublisher>,
    tick_ms: u64,
) -> Result<()> {
    let mut interval = tokio::time::interval(StdDuration::from_millis(tick_ms));
    loop {
        interval.tick().await;
        let now = Utc::now();
        match nestwatch_scheduler::run_tick(&store, &dedup, publisher.as_ref(), now).await {
            Ok(report) => {
                info!(
                    due = report.due,
                    dispatched = report.dispatched,
                    cache_hits = report.cache_hits,
                    publish_failures = report.publish_failures,
                    "tick complete"
                );
                stats::flush(&store, (&report).into()).await;
            }
            Err(err) => error!(error = %err, "tick failed"),
        }
    }
}

/// Consume `worker_heartbeat` (fanout) and run each message through the
/// anti-fraud verifier.
async fn run_heartbeat_consumer(
    store: Store,
    verifier: Arc<HeartbeatVerifier>,
    channel: lapin::Channel,
) -> Result<()> {
    channel
        .exchange_declare(
            amqp::EXCHANGE_WORKER_HEARTBEAT,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    let queue = channel
        .queue_declare(
            "scheduler.heartbeat",
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            queue.name().as_str(),
            amqp::EXCHANGE_WORKER_HEARTBEAT,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel.basic_qos(32, BasicQosOptions::default()).await?;

    let mut consumer = channel
        .basic_consume(
            queue.name().as_str(),
            "scheduler.heartbeat.consumer",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        match serde_json::from_slice::<HeartbeatMessage>(&delivery.data) {
            Ok(heartbeat_msg) => {
                if let Err(err) =
                    heartbeat::accept_heartbeat(&store, &verifier, &heartbeat_msg, Utc::now()).await
                {
                    error!(error = %err, "error processing heartbeat");
                }
            }
            Err(err) => warn!(error = %err, "undecodable heartbeat message, dropping"),
        }
        delivery.ack(BasicAckOptions::default()).await?;
    }
    Ok(())
}

/// Evict stale workers from `workers:heartbeat` once per janitor interval.
async fn run_heartbeat_janitor(store: Store, timeout_ms: u64) -> Result<()> {
    let mut interval = tokio::time::interval(StdDuration::from_secs(
        nestwatch_protocol::defaults::DEFAULT_JANITOR_INTERVAL_SECS,
    ));
    loop {
        interval.tick().await;
        match heartbeat::sweep_stale_workers(&store, timeout_ms, Utc::now()).await {
            Ok(evicted) if !evicted.is_empty() => info!(count = evicted.len(), "evicted stale workers"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "heartbeat janitor sweep failed"),
        }
    }
}

/// Consume `monitoring_results` and feed every result through ingestion.
async fn run_result_consumer(store: Store, channel: lapin::Channel) -> Result<()> {
    channel
        .exchange_declare(
            amqp::EXCHANGE_MONITORING_RESULTS,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    let queue = channel
        .queue_declare(
            "scheduler.results",
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            queue.name().as_str(),
            amqp::EXCHANGE_MONITORING_RESULTS,
            amqp::ROUTING_KEY_CHECK_COMPLETED,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut consumer = channel
        .basic_consume(
            queue.name().as_str(),
            "scheduler.results.consumer",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        match serde_json::from_slice::<ProbeResultMessage>(&delivery.data) {
            Ok(msg) => {
                if let Err(err) = ingestion::ingest_result(&store, msg).await {
                    error!(error = %err, "error ingesting probe result");
                }
            }
            Err(err) => warn!(error = %err, "undecodable probe result message, dropping"),
        }
        delivery.ack(BasicAckOptions::default()).await?;
    }
    Ok(())
}

/// Consume `monitor_service`/`stop_monitoring` control commands from the
/// admin collaborator.
async fn run_command_consumer(store: Store, channel: lapin::Channel) -> Result<()> {
    let queue = channel
        .queue_declare(
            "scheduler.commands",
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            queue.name().as_str(),
            amqp::EXCHANGE_WORKER_COMMANDS,
            amqp::ROUTING_KEY_MONITOR_SERVICE,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            queue.name().as_str(),
            amqp::EXCHANGE_WORKER_COMMANDS,
            amqp::ROUTING_KEY_STOP_MONITORING,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut consumer = channel
        .basic_consume(
            queue.name().as_str(),
            "scheduler.commands.consumer",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        let routing_key = delivery.routing_key.as_str();
        let outcome = if routing_key == amqp::ROUTING_KEY_MONITOR_SERVICE {
            match serde_json::from_slice::<Service>(&delivery.data) {
                Ok(service) => service_ops::monitor_service(&store, service).await,
                Err(err) => {
                    warn!(error = %err, "undecodable monitor_service command, dropping");
                    Ok(())
                }
            }
        } else if routing_key == amqp::ROUTING_KEY_STOP_MONITORING {
            match serde_json::from_slice::<serde_json::Value>(&delivery.data) {
                Ok(value) => match value.get("service_id").and_then(|v| v.as_str()) {
                    Some(service_id) => service_ops::stop_monitoring(&store, service_id).await,
                    None => {
                        warn!("stop_monitoring command missing service_id, dropping");
                        Ok(())
                    }
                },
                Err(err) => {
                    warn!(error = %err, "undecodable stop_monitoring command, dropping");
                    Ok(())
                }
            }
        } else {
            warn!(routing_key, "unrecognized control command routing key");
            Ok(())
        };

        if let Err(err) = outcome {
            error!(error = %err, "error applying control command");
        }
        delivery.ack(BasicAckOptions::default()).await?;
    }
    Ok(())
}
