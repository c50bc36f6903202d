use crate::common::retry::{RetryPolicy, retry};
use anyhow::{Result, anyhow};
use lapin::{Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Shared broker connection. Each consumer opens its own channel on it.
#[derive(Clone)]
pub struct RabbitMqService {
    conn: Arc<Connection>,
}

impl RabbitMqService {
    async fn connect_once(url: &str) -> Result<Connection> {
        Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))
    }

    /// Connect with bounded exponential backoff. Exhausting the policy is a
    /// startup failure.
    pub async fn connect(url: &str, policy: &RetryPolicy) -> Result<Self> {
        info!("Connecting to RabbitMQ");
        let conn = retry(policy, "rabbitmq connect", || Self::connect_once(url)).await?;
        info!("Connected to RabbitMQ");

        Ok(Self { conn: Arc::new(conn) })
    }

    pub async fn create_channel(&self) -> Result<Channel, lapin::Error> {
        self.conn.create_channel().await
    }

    /// Close the connection once `shutdown` fires. Close errors are logged,
    /// never propagated.
    pub fn spawn_close_on(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let conn = Arc::clone(&self.conn);
        tokio::spawn(async move {
            shutdown.cancelled().await;

            if !conn.status().connected() {
                warn!("RabbitMQ connection already closed");
                return;
            }

            match conn.close(200, "worker shutdown").await {
                Ok(()) => info!("RabbitMQ connection closed"),
                Err(e) => error!(error = %e, "Failed to close RabbitMQ connection"),
            }
        })
    }
}
