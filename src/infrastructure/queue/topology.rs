use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{Channel, ExchangeKind};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
#[error("failed to {step} '{name}': {source}")]
pub struct TopologyError {
    pub step: &'static str,
    pub name: &'static str,
    #[source]
    pub source: lapin::Error,
}

/// Exchanges, queues and routing keys of one job family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueTopology {
    pub exchange: &'static str,
    pub queue: &'static str,
    pub routing_key: &'static str,
    pub dead_letter_exchange: &'static str,
    pub dead_letter_queue: &'static str,
    pub dead_letter_routing_key: &'static str,
}

impl QueueTopology {
    pub const TRANSCODE: QueueTopology = QueueTopology {
        exchange: "transcoding_exchange",
        queue: "transcoding_queue",
        routing_key: "video.transcoding.request",
        dead_letter_exchange: "transcoding_exchange_dlx",
        dead_letter_queue: "transcoding_queue_dlq",
        dead_letter_routing_key: "dlq.video.transcoding.request",
    };

    pub const RECORDING_MERGE: QueueTopology = QueueTopology {
        exchange: "recording_exchange",
        queue: "recording_merge_queue",
        routing_key: "recording.merge.request",
        dead_letter_exchange: "recording_exchange_dlx",
        dead_letter_queue: "recording_merge_queue_dlq",
        dead_letter_routing_key: "dlq.recording.merge.request",
    };

    /// Arguments that make the broker route rejected messages to the DLX.
    pub fn dead_letter_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(LongString::from(self.dead_letter_exchange)),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(LongString::from(self.dead_letter_routing_key)),
        );
        args
    }

    /// Declare both exchanges, both queues and their bindings. Every entity
    /// is durable.
    pub async fn declare(&self, channel: &Channel) -> Result<(), TopologyError> {
        let fail = |step: &'static str, name: &'static str| {
            move |source: lapin::Error| {
                error!(step, name, error = %source, "topology declaration failed");
                TopologyError { step, name, source }
            }
        };

        channel
            .exchange_declare(self.exchange, ExchangeKind::Topic, durable_exchange(), FieldTable::default())
            .await
            .map_err(fail("declare exchange", self.exchange))?;

        channel
            .exchange_declare(
                self.dead_letter_exchange,
                ExchangeKind::Topic,
                durable_exchange(),
                FieldTable::default(),
            )
            .await
            .map_err(fail("declare dead-letter exchange", self.dead_letter_exchange))?;

        channel
            .queue_declare(self.dead_letter_queue, durable_queue(), FieldTable::default())
            .await
            .map_err(fail("declare dead-letter queue", self.dead_letter_queue))?;

        channel
            .queue_bind(
                self.dead_letter_queue,
                self.dead_letter_exchange,
                self.dead_letter_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(fail("bind dead-letter queue", self.dead_letter_queue))?;

        channel
            .queue_declare(self.queue, durable_queue(), self.dead_letter_arguments())
            .await
            .map_err(fail("declare queue", self.queue))?;

        channel
            .queue_bind(
                self.queue,
                self.exchange,
                self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(fail("bind queue", self.queue))?;

        debug!(queue = self.queue, exchange = self.exchange, "topology declared");
        Ok(())
    }
}

fn durable_exchange() -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        durable: true,
        ..ExchangeDeclareOptions::default()
    }
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}
