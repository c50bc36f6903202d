use super::pool::{ConsumerState, InboundDelivery, MessageHandler, PoolExit, Settlement, WorkerPool};
use super::rabbitmq::RabbitMqService;
use super::topology::{QueueTopology, TopologyError};
use crate::common::retry::RetryPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use lapin::Channel;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions};
use lapin::types::FieldTable;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("failed to open channel for '{queue}': {source}")]
    Channel {
        queue: &'static str,
        #[source]
        source: lapin::Error,
    },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("failed to set prefetch on '{queue}': {source}")]
    Qos {
        queue: &'static str,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to start consuming '{queue}': {source}")]
    Consume {
        queue: &'static str,
        #[source]
        source: lapin::Error,
    },

    #[error("delivery stream for '{0}' closed unexpectedly")]
    StreamClosed(&'static str),

    #[error("delivery stream for '{queue}' failed: {source}")]
    Stream {
        queue: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

#[async_trait]
impl InboundDelivery for Delivery {
    fn payload(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }

    fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn settle(&self, settlement: Settlement) -> anyhow::Result<()> {
        let result = match settlement {
            Settlement::Ack => self.acker.ack(BasicAckOptions::default()).await.map(|_| ()),
            Settlement::DeadLetter => self
                .acker
                .nack(BasicNackOptions {
                    requeue: false,
                    ..BasicNackOptions::default()
                })
                .await
                .map(|_| ()),
            Settlement::Requeue => self
                .acker
                .nack(BasicNackOptions {
                    requeue: true,
                    ..BasicNackOptions::default()
                })
                .await
                .map(|_| ()),
        };

        result.map_err(anyhow::Error::from)
    }
}

/// Consumer for one job family: declares the family topology, then feeds a
/// worker pool from a dedicated channel until cancelled.
pub struct QueueConsumer<T> {
    rabbitmq: RabbitMqService,
    topology: QueueTopology,
    pool: WorkerPool<T>,
    state: watch::Sender<ConsumerState>,
}

impl<T> QueueConsumer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        rabbitmq: RabbitMqService,
        topology: QueueTopology,
        workers: usize,
        handler: impl MessageHandler<T>,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            rabbitmq,
            topology,
            pool: WorkerPool::new(topology.queue, workers, handler),
            state,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.pool = self.pool.with_retry_policy(retry);
        self
    }

    pub fn queue(&self) -> &'static str {
        self.topology.queue
    }

    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run until `cancel` fires. Returns `Ok(())` after a clean drain and an
    /// error when setup fails or the broker closes the stream underneath us.
    pub async fn consume(&self, deps: T, cancel: CancellationToken) -> Result<(), ConsumerError> {
        let queue = self.topology.queue;
        self.state.send_replace(ConsumerState::DeclaringTopology);

        let result = self.consume_inner(deps, cancel).await;
        self.state.send_replace(ConsumerState::Stopped);

        match &result {
            Ok(()) => info!(queue, "consumer stopped"),
            Err(e) => error!(queue, error = %e, "consumer stopped with error"),
        }
        result
    }

    async fn consume_inner(&self, deps: T, cancel: CancellationToken) -> Result<(), ConsumerError> {
        let queue = self.topology.queue;

        let channel = self
            .rabbitmq
            .create_channel()
            .await
            .map_err(|source| ConsumerError::Channel { queue, source })?;

        let result = self.consume_on(&channel, deps, cancel).await;
        release_channel(queue, &channel, result).await
    }

    async fn consume_on(&self, channel: &Channel, deps: T, cancel: CancellationToken) -> Result<(), ConsumerError> {
        let queue = self.topology.queue;

        self.topology.declare(channel).await?;

        let prefetch = u16::try_from(self.pool.workers()).unwrap_or(u16::MAX);
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|source| ConsumerError::Qos { queue, source })?;

        let consumer_tag = format!("{queue}-consumer");
        let deliveries = channel
            .basic_consume(queue, &consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|source| ConsumerError::Consume { queue, source })?;

        self.state.send_replace(ConsumerState::Consuming);
        info!(queue, workers = self.pool.workers(), prefetch, "consumer started");

        match self.pool.run(deliveries, deps, cancel, &self.state).await {
            PoolExit::Cancelled => Ok(()),
            PoolExit::StreamEnded => Err(ConsumerError::StreamClosed(queue)),
            PoolExit::StreamFailed(source) => Err(ConsumerError::Stream { queue, source }),
        }
    }
}

#[async_trait]
trait CloseChannel: Sync {
    async fn close_channel(&self, reason: &str) -> Result<(), lapin::Error>;
}

#[async_trait]
impl CloseChannel for Channel {
    async fn close_channel(&self, reason: &str) -> Result<(), lapin::Error> {
        self.close(200, reason).await
    }
}

/// Close `channel` whatever `result` is, then hand `result` back.
async fn release_channel<C: CloseChannel, R>(queue: &'static str, channel: &C, result: R) -> R {
    if let Err(e) = channel.close_channel("consumer stopped").await {
        warn!(queue, error = %e, "failed to close channel");
    }
    result
}
