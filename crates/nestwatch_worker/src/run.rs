//! The worker's bus loop: consume probe commands, execute them, publish
//! results, and emit heartbeats on a timer (§4.1 command envelope, §5
//! "workers must discard commands older than 2·interval").

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ExchangeKind};
use nestwatch_protocol::defaults::{amqp, DEFAULT_COMMAND_MAX_AGE_SECS};
use nestwatch_protocol::types::{ProbeCommand, ProbeResultMessage, WorkerLocation};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::heartbeat::{build_heartbeat, WorkerTally};
use crate::probe;

pub struct WorkerRuntime {
    pub worker_id: String,
    pub region: String,
    pub version: String,
    pub signing_key: Option<String>,
    pub http: reqwest::Client,
    pub tally: Mutex<WorkerTally>,
}

impl WorkerRuntime {
    pub fn new(worker_id: String, region: String, signing_key: Option<String>) -> Self {
        Self {
            worker_id,
            region,
            version: env!("CARGO_PKG_VERSION").to_string(),
            signing_key,
            http: reqwest::Client::new(),
            tally: Mutex::new(WorkerTally::default()),
        }
    }
}

/// Declare and bind this worker's own command queue, then consume
/// `check_service_once` (and, if `region` is set, `check_service_once.<region>`)
/// until the channel closes.
pub async fn run_command_consumer(
    runtime: Arc<WorkerRuntime>,
    channel: Channel,
    results_channel: Channel,
) -> Result<()> {
    channel
        .exchange_declare(
            amqp::EXCHANGE_WORKER_COMMANDS,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    let queue_name = amqp::worker_queue_name(&runtime.region, &runtime.worker_id);
    let queue = channel
        .queue_declare(
            &queue_name,
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
            amqp::ROUTING_KEY_CHECK_SERVICE_ONCE,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;
    if runtime.region != nestwatch_protocol::types::WorkerRegistration::AUTO_REGION {
        channel
            .queue_bind(
                queue.name().as_str(),
                amqp::EXCHANGE_WORKER_COMMANDS,
                &amqp::routing_key_for_region(&runtime.region),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    results_channel
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

    let mut consumer = channel
        .basic_consume(
            queue.name().as_str(),
            &format!("{}.consumer", runtime.worker_id),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!(queue = queue.name().as_str(), "worker listening for probe commands");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        match serde_json::from_slice::<ProbeCommand>(&delivery.data) {
            Ok(command) => {
                if is_stale(&command) {
                    warn!(service_id = %command.data.service_id, "discarding stale probe command");
                } else if let Err(err) = execute_and_publish(&runtime, &results_channel, command).await {
                    warn!(error = %err, "failed to execute/publish probe result");
                }
            }
            Err(err) => warn!(error = %err, "undecodable probe command, dropping"),
        }
        delivery.ack(BasicAckOptions::default()).await?;
    }
    Ok(())
}

fn is_stale(command: &ProbeCommand) -> bool {
    let age_ms = Utc::now().timestamp_millis() - command.timestamp;
    age_ms > DEFAULT_COMMAND_MAX_AGE_SECS * 1000
}

async fn execute_and_publish(
    runtime: &WorkerRuntime,
    results_channel: &Channel,
    command: ProbeCommand,
) -> Result<()> {
    let outcome = probe::run(&runtime.http, &command.data.target, &command.data.config).await;

    {
        let mut tally = runtime.tally.lock().await;
        tally.record_check(1.0);
    }

    let result = ProbeResultMessage {
        service_id: command.data.service_id,
        nest_id: command.data.nest_id,
        cache_key: Some(command.data.cache_key),
        worker_id: runtime.worker_id.clone(),
        region: runtime.region.clone(),
        status: outcome.status,
        response_time: outcome.response_time_ms,
        error: outcome.error,
        timestamp: Utc::now().timestamp_millis(),
    };

    let payload = serde_json::to_vec(&result)?;
    results_channel
        .basic_publish(
            amqp::EXCHANGE_MONITORING_RESULTS,
            amqp::ROUTING_KEY_CHECK_COMPLETED,
            BasicPublishOptions::default(),
            &payload,
            BasicProperties::default().with_delivery_mode(2),
        )
        .await?
        .await?;
    debug!(service_id = %result.service_id, status = ?result.status, "published probe result");
    Ok(())
}

/// Emit a signed heartbeat on the fanout exchange every `interval`.
pub async fn run_heartbeat_loop(
    runtime: Arc<WorkerRuntime>,
    connection: &Connection,
    location: WorkerLocation,
    interval: Duration,
) -> Result<()> {
    let channel = connection.create_channel().await?;
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

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let tally = runtime.tally.lock().await.clone();
        let heartbeat = build_heartbeat(
            &runtime.worker_id,
            &runtime.region,
            &runtime.version,
            &tally,
            location.clone(),
            runtime.signing_key.as_deref(),
        );
        let payload = serde_json::to_vec(&heartbeat)?;
        if let Err(err) = channel
            .basic_publish(
                amqp::EXCHANGE_WORKER_HEARTBEAT,
                "",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
        {
            warn!(error = %err, "failed to publish heartbeat");
        }
    }
}
