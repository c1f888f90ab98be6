//! Queueing port (C6): a `Broker` trait over the three durable pipeline
//! queues (§4.6), implemented by `LapinBroker` (AMQP 0-9-1, i.e. RabbitMQ)
//! and by an in-memory `FakeBroker` used by every worker-engine test.

pub mod broker;
pub mod error;
pub mod fake;
pub mod lapin_broker;
pub mod types;

pub use broker::Broker;
pub use error::{BrokerError, Result};
pub use fake::FakeBroker;
pub use lapin_broker::LapinBroker;
pub use types::{
    dlq_queue_name, retry_queue_name, Delivery, DeliveryToken, JobMessage, DELETE_QUEUE,
    GRAPH_QUEUE, MAIN_QUEUES, PREPROCESS_QUEUE,
};
