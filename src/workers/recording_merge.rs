use crate::common::error::NonRetryableExt;
use crate::infrastructure::queue::consumer::QueueConsumer;
use crate::infrastructure::queue::pool::DeliveryContext;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::queue::topology::QueueTopology;
use crate::modules::recording::events::RecordingMergeMessage;
use crate::modules::recording::service::RecordingMergeService;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub type RecordingMergeDeps = Arc<RecordingMergeService>;

pub fn recording_merge_consumer(rabbitmq: RabbitMqService, workers: usize) -> QueueConsumer<RecordingMergeDeps> {
    QueueConsumer::new(rabbitmq, QueueTopology::RECORDING_MERGE, workers, handle_delivery)
}

pub async fn handle_delivery(ctx: DeliveryContext, service: RecordingMergeDeps) -> Result<()> {
    let message: RecordingMergeMessage = serde_json::from_slice(&ctx.payload)
        .context("undecodable recording merge message")
        .non_retryable()?;

    info!(
        job_id = %message.job_id,
        live_session_id = %message.live_session_id,
        attempt = ctx.attempt,
        "📼 Received recording merge job"
    );

    let outcome = service.process(&message).await?;
    debug!(job_id = %message.job_id, ?outcome, "recording merge delivery handled");
    Ok(())
}
