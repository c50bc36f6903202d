use crate::common::error::NonRetryableExt;
use crate::infrastructure::queue::consumer::QueueConsumer;
use crate::infrastructure::queue::pool::DeliveryContext;
use crate::infrastructure::queue::rabbitmq::RabbitMqService;
use crate::infrastructure::queue::topology::QueueTopology;
use crate::modules::transcode::events::JobMessage;
use crate::modules::transcode::service::TranscodeService;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

pub type TranscodeDeps = Arc<TranscodeService>;

pub fn transcode_consumer(rabbitmq: RabbitMqService, workers: usize) -> QueueConsumer<TranscodeDeps> {
    QueueConsumer::new(rabbitmq, QueueTopology::TRANSCODE, workers, handle_delivery)
}

pub async fn handle_delivery(ctx: DeliveryContext, service: TranscodeDeps) -> Result<()> {
    let message: JobMessage = serde_json::from_slice(&ctx.payload)
        .context("undecodable transcode message")
        .non_retryable()?;

    info!(
        job_id = %message.job_id,
        object_path = %message.object_path,
        attempt = ctx.attempt,
        redelivered = ctx.redelivered,
        "📦 Received transcoding job"
    );

    let outcome = service.process(&message).await?;
    debug!(job_id = %message.job_id, ?outcome, "transcoding delivery handled");
    Ok(())
}
