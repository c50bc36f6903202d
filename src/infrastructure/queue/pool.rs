//! Fixed-size worker pool fed by a single delivery reader.
//!
//! One reader pulls deliveries from the broker stream into a bounded buffer
//! of capacity `N`, drained by `N` workers. Each worker runs the handler
//! under bounded retry and settles every delivery exactly once:
//!
//! - handler succeeded: ack
//! - attempts exhausted or error marked non-retryable: nack without requeue
//!   (the broker dead-letters it)
//! - shutdown while waiting to retry: nack with requeue
//!
//! On cancellation the reader stops pulling, the buffer is closed, and the
//! pool returns once every worker has finished its current delivery.

use crate::common::error::is_non_retryable;
use crate::common::retry::RetryPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream, StreamExt};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    DeadLetter,
    Requeue,
}

/// A broker delivery as seen by the pool.
#[async_trait]
pub trait InboundDelivery: Send + Sync + 'static {
    fn payload(&self) -> Bytes;
    fn delivery_tag(&self) -> u64;
    fn redelivered(&self) -> bool;
    async fn settle(&self, settlement: Settlement) -> anyhow::Result<()>;
}

/// Per-delivery context handed to the handler on every attempt.
#[derive(Clone, Debug)]
pub struct DeliveryContext {
    pub queue: &'static str,
    pub worker_id: usize,
    pub delivery_tag: u64,
    pub redelivered: bool,
    /// 1-based attempt number within this worker's retry loop.
    pub attempt: u32,
    pub payload: Bytes,
}

pub trait MessageHandler<T>: Send + Sync + 'static {
    fn handle(&self, ctx: DeliveryContext, deps: T) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<T, F, Fut> MessageHandler<T> for F
where
    F: Fn(DeliveryContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(&self, ctx: DeliveryContext, deps: T) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(ctx, deps))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Idle,
    DeclaringTopology,
    Consuming,
    Draining,
    Stopped,
}

impl fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConsumerState::Idle => "idle",
            ConsumerState::DeclaringTopology => "declaring_topology",
            ConsumerState::Consuming => "consuming",
            ConsumerState::Draining => "draining",
            ConsumerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum PoolExit {
    Cancelled,
    StreamEnded,
    StreamFailed(anyhow::Error),
}

pub struct WorkerPool<T> {
    queue: &'static str,
    workers: usize,
    retry: RetryPolicy,
    handler: Arc<dyn MessageHandler<T>>,
}

impl<T> WorkerPool<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(queue: &'static str, workers: usize, handler: impl MessageHandler<T>) -> Self {
        Self {
            queue,
            workers: workers.max(1),
            retry: RetryPolicy::default(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drain `deliveries` until cancellation or the end of the stream.
    pub async fn run<M, S, E>(
        &self,
        deliveries: S,
        deps: T,
        cancel: CancellationToken,
        state: &watch::Sender<ConsumerState>,
    ) -> PoolExit
    where
        M: InboundDelivery,
        S: Stream<Item = Result<M, E>> + Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut deliveries = std::pin::pin!(deliveries);
        let (tx, rx) = async_channel::bounded::<Arc<M>>(self.workers);

        let mut workers = JoinSet::new();
        for worker_id in 1..=self.workers {
            let rx = rx.clone();
            let worker = Worker {
                queue: self.queue,
                worker_id,
                retry: self.retry.clone(),
                handler: Arc::clone(&self.handler),
                deps: deps.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(async move {
                while let Ok(delivery) = rx.recv().await {
                    worker.process(delivery.as_ref()).await;
                }
            });
        }
        drop(rx);

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PoolExit::Cancelled,
                next = deliveries.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => Arc::new(delivery),
                Some(Err(e)) => {
                    error!(queue = self.queue, error = %e, "delivery stream failed");
                    break PoolExit::StreamFailed(e.into());
                }
                None => {
                    warn!(queue = self.queue, "delivery stream ended");
                    break PoolExit::StreamEnded;
                }
            };

            // The buffer only fills up when every worker is busy.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    requeue_unassigned(self.queue, delivery.as_ref()).await;
                    break PoolExit::Cancelled;
                }
                sent = tx.send(Arc::clone(&delivery)) => {
                    if sent.is_err() {
                        requeue_unassigned(self.queue, delivery.as_ref()).await;
                        break PoolExit::StreamEnded;
                    }
                }
            }
        };

        state.send_replace(ConsumerState::Draining);
        info!(queue = self.queue, "draining in-flight deliveries");
        tx.close();

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(queue = self.queue, error = %e, "worker task aborted");
            }
        }

        exit
    }
}

async fn requeue_unassigned<M: InboundDelivery>(queue: &'static str, delivery: &M) {
    if let Err(e) = delivery.settle(Settlement::Requeue).await {
        error!(queue, delivery_tag = delivery.delivery_tag(), error = %e, "failed to requeue delivery");
    }
}

struct Worker<T> {
    queue: &'static str,
    worker_id: usize,
    retry: RetryPolicy,
    handler: Arc<dyn MessageHandler<T>>,
    deps: T,
    cancel: CancellationToken,
}

impl<T> Worker<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn process<M: InboundDelivery>(&self, delivery: &M) {
        let span = info_span!(
            "delivery",
            queue = self.queue,
            worker_id = self.worker_id,
            delivery_tag = delivery.delivery_tag()
        );

        async {
            let settlement = self.handle_with_retry(delivery).await;
            if let Err(e) = delivery.settle(settlement).await {
                error!(error = %e, ?settlement, "failed to settle delivery");
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_with_retry<M: InboundDelivery>(&self, delivery: &M) -> Settlement {
        let payload = delivery.payload();
        let mut attempt = 1;

        loop {
            let ctx = DeliveryContext {
                queue: self.queue,
                worker_id: self.worker_id,
                delivery_tag: delivery.delivery_tag(),
                redelivered: delivery.redelivered(),
                attempt,
                payload: payload.clone(),
            };

            let outcome = AssertUnwindSafe(self.handler.handle(ctx, self.deps.clone()))
                .catch_unwind()
                .await;

            let err = match outcome {
                Ok(Ok(())) => {
                    debug!(attempt, "delivery handled");
                    return Settlement::Ack;
                }
                Ok(Err(e)) => e,
                Err(_) => {
                    error!(attempt, "handler panicked; dead-lettering delivery");
                    return Settlement::DeadLetter;
                }
            };

            if is_non_retryable(&err) {
                error!(attempt, error = %format!("{:#}", err), "non-retryable failure; dead-lettering delivery");
                return Settlement::DeadLetter;
            }

            if attempt >= self.retry.max_attempts {
                error!(attempt, error = %format!("{:#}", err), "failed to handle message after all retries");
                return Settlement::DeadLetter;
            }

            let delay = self.retry.delay_for(attempt);
            warn!(attempt, ?delay, error = %format!("{:#}", err), "handler failed, retrying");

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(attempt, "shutdown during retry backoff; requeueing delivery");
                    return Settlement::Requeue;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
