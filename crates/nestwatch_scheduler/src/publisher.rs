//! The outbound half of the bus abstraction (§6): publishing probe commands
//! onto `worker_commands`.
//!
//! Kept as a narrow trait rather than exposing `lapin::Channel` directly so
//! the tick loop and region-routing logic (§4.1, §8 scenarios 1-2) can be
//! exercised against a recording fake without a broker — mirrors the
//! `StorageBackend` seam in `nestwatch_storage`.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ExchangeKind};
use nestwatch_protocol::defaults::amqp;
use nestwatch_protocol::types::ProbeCommand;

use crate::error::Result;

#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publish one command to `worker_commands` under the given routing key.
    async fn publish(&self, routing_key: &str, command: &ProbeCommand) -> Result<()>;
}

/// Real publisher, backed by a declared `lapin::Channel`.
pub struct LapinPublisher {
    channel: Channel,
}

impl LapinPublisher {
    /// Declare `worker_commands` idempotently and wrap the channel. Called
    /// once at startup and again on every broker reconnect (§4.1 "tolerates
    /// broker reconnects by re-declaring exchanges/queues on resume").
    pub async fn declare(channel: Channel) -> Result<Self> {
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
        Ok(Self { channel })
    }
}

#[async_trait]
impl CommandPublisher for LapinPublisher {
    async fn publish(&self, routing_key: &str, command: &ProbeCommand) -> Result<()> {
        let payload = serde_json::to_vec(command)?;
        self.channel
            .basic_publish(
                amqp::EXCHANGE_WORKER_COMMANDS,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2), // persistent
            )
            .await?
            .await?;
        Ok(())
    }
}

/// Test double recording every publish call in order, for the region-fanout
/// and dedup scenarios in §8 that need to assert on outbound message count
/// and routing keys without a broker.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: tokio::sync::Mutex<Vec<(String, ProbeCommand)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, command: &ProbeCommand) -> Result<()> {
        self.published
            .lock()
            .await
            .push((routing_key.to_string(), command.clone()));
        Ok(())
    }
}
