//! Scheduled dead-letter replay.
//!
//! Each sweep pulls at most `batch_size` messages off a family's DLQ. A
//! message replayed fewer than `max_replays` times goes back to the primary
//! exchange with its `x-replay-count` header bumped. Anything past the limit
//! is parked: republished to the dead-letter exchange so it lands at the tail
//! of the DLQ for manual inspection. The DLQ copy is acked only after the
//! republish is confirmed.

use super::rabbitmq::RabbitMqService;
use super::topology::QueueTopology;
use crate::config::settings::DlqReplayConfig;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, ConfirmSelectOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const REPLAY_COUNT_HEADER: &str = "x-replay-count";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayAction {
    Replay { next_count: u32 },
    Park,
}

pub fn decide(replay_count: u32, max_replays: u32) -> ReplayAction {
    if replay_count < max_replays {
        ReplayAction::Replay {
            next_count: replay_count + 1,
        }
    } else {
        ReplayAction::Park
    }
}

/// Replay counter carried in the message headers. Missing or non-integer
/// values count as zero.
pub fn replay_count(properties: &BasicProperties) -> u32 {
    let Some(headers) = properties.headers() else {
        return 0;
    };

    headers
        .inner()
        .iter()
        .find(|(k, _)| k.as_str() == REPLAY_COUNT_HEADER)
        .and_then(|(_, v)| match v {
            AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortShortUInt(n) => Some(u32::from(*n)),
            AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
            AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
            AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
            AMQPValue::LongUInt(n) => Some(*n),
            AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// Copy of `properties` with the replay counter set and persistence forced.
pub fn with_replay_count(properties: &BasicProperties, count: u32) -> BasicProperties {
    let mut headers = properties.headers().clone().unwrap_or_default();
    headers.insert(
        REPLAY_COUNT_HEADER.into(),
        AMQPValue::LongInt(i32::try_from(count).unwrap_or(i32::MAX)),
    );

    properties.clone().with_headers(headers).with_delivery_mode(2)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub replayed: u32,
    pub parked: u32,
}

pub struct DlqReplayer {
    rabbitmq: RabbitMqService,
    topology: QueueTopology,
    config: DlqReplayConfig,
}

impl DlqReplayer {
    pub fn new(rabbitmq: RabbitMqService, topology: QueueTopology, config: DlqReplayConfig) -> Self {
        Self {
            rabbitmq,
            topology,
            config,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let queue = self.topology.dead_letter_queue;
        info!(queue, max_replays = self.config.max_replays, "DLQ replay scheduled");

        loop {
            let Some(next) = self.config.schedule.upcoming(Utc).next() else {
                warn!(queue, "replay schedule has no upcoming runs");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(queue, "DLQ replay stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            match self.sweep().await {
                Ok(report) if report == SweepReport::default() => debug!(queue, "DLQ empty"),
                Ok(report) => info!(queue, replayed = report.replayed, parked = report.parked, "DLQ sweep finished"),
                Err(e) => error!(queue, error = %format!("{:#}", e), "DLQ sweep failed"),
            }
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport> {
        let channel = self
            .rabbitmq
            .create_channel()
            .await
            .context("failed to open replay channel")?;

        let result = self.sweep_on(&channel).await;

        if let Err(e) = channel.close(200, "replay sweep done").await {
            warn!(queue = self.topology.dead_letter_queue, error = %e, "failed to close replay channel");
        }
        result
    }

    async fn sweep_on(&self, channel: &Channel) -> Result<SweepReport> {
        let dlq = self.topology.dead_letter_queue;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .context("failed to enable publisher confirms")?;

        let depth = channel
            .queue_declare(
                dlq,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("failed to inspect '{}'", dlq))?
            .message_count();

        // Parked messages go back to the tail, so only look at what was
        // there when the sweep started.
        let budget = depth.min(self.config.batch_size);
        let mut report = SweepReport::default();

        for _ in 0..budget {
            let Some(message) = channel
                .basic_get(dlq, BasicGetOptions { no_ack: false })
                .await
                .with_context(|| format!("failed to get from '{}'", dlq))?
            else {
                break;
            };
            let delivery = message.delivery;

            let action = decide(replay_count(&delivery.properties), self.config.max_replays);
            let (exchange, routing_key, properties) = match action {
                ReplayAction::Replay { next_count } => (
                    self.topology.exchange,
                    self.topology.routing_key,
                    with_replay_count(&delivery.properties, next_count),
                ),
                ReplayAction::Park => (
                    self.topology.dead_letter_exchange,
                    self.topology.dead_letter_routing_key,
                    delivery.properties.clone(),
                ),
            };

            if let Err(e) = publish(channel, exchange, routing_key, &delivery.data, properties).await {
                if let Err(nack_err) = delivery
                    .acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
                {
                    warn!(queue = dlq, error = %nack_err, "failed to return message to DLQ");
                }
                return Err(e.context(format!("failed to republish from '{}'", dlq)));
            }

            delivery
                .acker
                .ack(BasicAckOptions::default())
                .await
                .with_context(|| format!("failed to ack message from '{}'", dlq))?;

            match action {
                ReplayAction::Replay { next_count } => {
                    debug!(queue = dlq, replay = next_count, "message replayed");
                    report.replayed += 1;
                }
                ReplayAction::Park => {
                    warn!(queue = dlq, "message exceeded replay limit; parked");
                    report.parked += 1;
                }
            }
        }

        Ok(report)
    }
}

async fn publish(
    channel: &Channel,
    exchange: &str,
    routing_key: &str,
    payload: &[u8],
    properties: BasicProperties,
) -> Result<()> {
    let confirmation = channel
        .basic_publish(exchange, routing_key, BasicPublishOptions::default(), payload, properties)
        .await
        .context("failed to publish message")?
        .await
        .context("failed to confirm publication")?;

    if confirmation.is_nack() {
        bail!("broker rejected publication to '{}'", exchange);
    }
    Ok(())
}
