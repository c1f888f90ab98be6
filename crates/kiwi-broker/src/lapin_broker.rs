use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongLongInt, ShortString};
use lapin::{BasicProperties, Connection, ConnectionProperties};

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::types::{dlq_queue_name, retry_queue_name, Delivery, DeliveryToken, JobMessage, MAIN_QUEUES};

const RETRIES_HEADER: &str = "x-retries";

/// `Broker` over a single AMQP 0-9-1 connection/channel (RabbitMQ in
/// practice). One `LapinBroker` per worker process; `Qos` is set per-consumer
/// at `consume` time since each queue gets its own prefetch.
pub struct LapinBroker {
    channel: lapin::Channel,
}

impl LapinBroker {
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;
        Ok(Self { channel })
    }

    async fn declare_one(&self, queue: &str) -> Result<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    fn retries_from_headers(properties: &BasicProperties) -> u32 {
        properties
            .headers()
            .as_ref()
            .and_then(|headers| headers.inner().get(RETRIES_HEADER))
            .and_then(|value| match value {
                AMQPValue::LongLongInt(n) => Some(*n as u32),
                AMQPValue::LongInt(n) => Some(*n as u32),
                _ => None,
            })
            .unwrap_or(0)
    }

    async fn publish_with_retries(&self, queue: &str, job: &JobMessage, retries: u32) -> Result<()> {
        let payload = serde_json::to_vec(job).map_err(|_| BrokerError::Closed)?;
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(RETRIES_HEADER),
            AMQPValue::LongLongInt(retries as LongLongInt),
        );
        let properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_headers(headers);
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for LapinBroker {
    async fn declare_topology(&self) -> Result<()> {
        for queue in MAIN_QUEUES {
            self.declare_one(queue).await?;
            self.declare_one(&retry_queue_name(queue)).await?;
            self.declare_one(&dlq_queue_name(queue)).await?;
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, job: &JobMessage) -> Result<()> {
        self.publish_with_retries(queue, job, 0).await
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<BoxStream<'static, Result<Delivery>>> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions { global: false })
            .await?;
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("kiwi-worker-{queue}"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        let queue = queue.to_string();
        let stream = consumer.map(move |delivery| {
            let delivery = delivery?;
            let retries = Self::retries_from_headers(&delivery.properties);
            let job: JobMessage =
                serde_json::from_slice(&delivery.data).map_err(|_| BrokerError::Closed)?;
            Ok(Delivery {
                queue: queue.clone(),
                job,
                retries,
                token: DeliveryToken::Lapin(delivery),
            })
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery: Delivery) -> Result<()> {
        Self::ack_token(delivery.token).await
    }

    async fn nack_requeue(&self, delivery: Delivery) -> Result<()> {
        match delivery.token {
            DeliveryToken::Lapin(d) => {
                d.nack(BasicNackOptions {
                    requeue: true,
                    multiple: false,
                })
                .await?;
                Ok(())
            }
            DeliveryToken::Fake(_) => Ok(()),
        }
    }

    async fn retry(&self, delivery: Delivery) -> Result<()> {
        let retry_queue = retry_queue_name(&delivery.queue);
        self.publish_with_retries(&retry_queue, &delivery.job, delivery.retries + 1)
            .await?;
        Self::ack_token(delivery.token).await
    }

    async fn dead_letter(&self, delivery: Delivery) -> Result<()> {
        let dlq = dlq_queue_name(&delivery.queue);
        self.publish_with_retries(&dlq, &delivery.job, delivery.retries).await?;
        Self::ack_token(delivery.token).await
    }
}

impl LapinBroker {
    async fn ack_token(token: DeliveryToken) -> Result<()> {
        match token {
            DeliveryToken::Lapin(d) => {
                d.ack(BasicAckOptions::default()).await?;
                Ok(())
            }
            DeliveryToken::Fake(_) => Ok(()),
        }
    }
}
