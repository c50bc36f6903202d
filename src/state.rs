use crate::config::settings::Environment;
use crate::infrastructure::queue::pool::ConsumerState;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle feed of one consumer, read by the health endpoint.
#[derive(Clone)]
pub struct ConsumerHandle {
    pub queue: &'static str,
    pub state: watch::Receiver<ConsumerState>,
}

#[derive(Clone)]
pub struct AppState {
    pub environment: Environment,
    pub consumers: Arc<Vec<ConsumerHandle>>,
}

impl AppState {
    pub fn new(environment: Environment, consumers: Vec<ConsumerHandle>) -> Self {
        Self {
            environment,
            consumers: Arc::new(consumers),
        }
    }
}
