use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::types::{dlq_queue_name, retry_queue_name, Delivery, DeliveryToken, JobMessage, MAIN_QUEUES};

struct Lane {
    tx: mpsc::Sender<(JobMessage, u32)>,
    rx: Mutex<Option<mpsc::Receiver<(JobMessage, u32)>>>,
}

/// In-memory `Broker` backed by one bounded `mpsc` channel per queue.
/// Acks are no-ops; `nack_requeue`/`retry`/`dead_letter` push the message
/// back onto the appropriate lane so tests can observe redelivery without a
/// live AMQP server.
pub struct FakeBroker {
    lanes: Mutex<HashMap<String, Lane>>,
    capacity: usize,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn ensure_lane(&self, name: &str) {
        let mut lanes = self.lanes.lock().unwrap();
        lanes.entry(name.to_string()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.capacity);
            Lane {
                tx,
                rx: Mutex::new(Some(rx)),
            }
        });
    }

    fn sender(&self, name: &str) -> mpsc::Sender<(JobMessage, u32)> {
        self.ensure_lane(name);
        self.lanes.lock().unwrap().get(name).unwrap().tx.clone()
    }

    async fn push(&self, queue: &str, job: JobMessage, retries: u32) -> Result<()> {
        self.sender(queue)
            .send((job, retries))
            .await
            .map_err(|_| BrokerError::Closed)
    }
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn declare_topology(&self) -> Result<()> {
        for queue in MAIN_QUEUES {
            self.ensure_lane(queue);
            self.ensure_lane(&retry_queue_name(queue));
            self.ensure_lane(&dlq_queue_name(queue));
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, job: &JobMessage) -> Result<()> {
        self.push(queue, job.clone(), 0).await
    }

    async fn consume(&self, queue: &str, _prefetch: u16) -> Result<BoxStream<'static, Result<Delivery>>> {
        self.ensure_lane(queue);
        let rx = {
            let lanes = self.lanes.lock().unwrap();
            lanes.get(queue).unwrap().rx.lock().unwrap().take()
        };
        let rx = rx.ok_or(BrokerError::Closed)?;
        let queue = queue.to_string();
        let mut seq: u64 = 0;
        let stream = ReceiverStream::new(rx).map(move |(job, retries)| {
            seq += 1;
            Ok(Delivery {
                queue: queue.clone(),
                job,
                retries,
                token: DeliveryToken::Fake(seq),
            })
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, _delivery: Delivery) -> Result<()> {
        Ok(())
    }

    async fn nack_requeue(&self, delivery: Delivery) -> Result<()> {
        self.push(&delivery.queue, delivery.job, delivery.retries).await
    }

    async fn retry(&self, delivery: Delivery) -> Result<()> {
        let retry_queue = retry_queue_name(&delivery.queue);
        self.push(&retry_queue, delivery.job, delivery.retries + 1).await
    }

    async fn dead_letter(&self, delivery: Delivery) -> Result<()> {
        let dlq = dlq_queue_name(&delivery.queue);
        self.push(&dlq, delivery.job, delivery.retries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiwi_core::domain::BatchOperation;

    fn job() -> JobMessage {
        JobMessage {
            message: "hello".into(),
            project_id: 1,
            correlation_id: "corr-1".into(),
            batch_id: 0,
            total_batches: 1,
            project_files: vec![10, 11],
            operation: BatchOperation::Index,
        }
    }

    #[tokio::test]
    async fn publish_then_consume_round_trips_the_job() {
        let broker = FakeBroker::new();
        broker.declare_topology().await.unwrap();
        broker.publish(crate::types::PREPROCESS_QUEUE, &job()).await.unwrap();

        let mut stream = broker
            .consume(crate::types::PREPROCESS_QUEUE, 1)
            .await
            .unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.job.correlation_id, "corr-1");
        assert_eq!(delivery.retries, 0);
        broker.ack(delivery).await.unwrap();
    }

    #[tokio::test]
    async fn retry_increments_retries_and_lands_on_the_retry_lane() {
        let broker = FakeBroker::new();
        broker.declare_topology().await.unwrap();
        broker.publish(crate::types::GRAPH_QUEUE, &job()).await.unwrap();

        let mut stream = broker.consume(crate::types::GRAPH_QUEUE, 1).await.unwrap();
        let delivery = stream.next().await.unwrap().unwrap();
        broker.retry(delivery).await.unwrap();
        drop(stream);

        let mut retry_stream = broker
            .consume(&retry_queue_name(crate::types::GRAPH_QUEUE), 1)
            .await
            .unwrap();
        let redelivered = retry_stream.next().await.unwrap().unwrap();
        assert_eq!(redelivered.retries, 1);
    }

    #[tokio::test]
    async fn dead_letter_preserves_retry_count_on_the_dlq_lane() {
        let broker = FakeBroker::new();
        broker.declare_topology().await.unwrap();
        broker.publish(crate::types::DELETE_QUEUE, &job()).await.unwrap();

        let mut stream = broker.consume(crate::types::DELETE_QUEUE, 1).await.unwrap();
        let mut delivery = stream.next().await.unwrap().unwrap();
        delivery.retries = 10;
        broker.dead_letter(delivery).await.unwrap();
        drop(stream);

        let mut dlq_stream = broker
            .consume(&dlq_queue_name(crate::types::DELETE_QUEUE), 1)
            .await
            .unwrap();
        let landed = dlq_stream.next().await.unwrap().unwrap();
        assert_eq!(landed.retries, 10);
    }
}
