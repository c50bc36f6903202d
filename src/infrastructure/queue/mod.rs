pub mod consumer;
pub mod pool;
pub mod rabbitmq;
pub mod replay;
pub mod topology;
