//! AMQP 0.9.1 binding via lapin, using RabbitMQ's direct reply-to pattern
//! for per-call reply subscriptions.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, warn};

use vox_core::errors::BrokerError;

use crate::channel::{BrokerChannel, BrokerConnector, Reply, RequestProperties};

/// Pseudo-queue the broker routes worker replies back through without a
/// declared queue per call.
pub const DIRECT_REPLY_TO: &str = "amq.rabbitmq.reply-to";

/// AMQP persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Opens one dedicated connection + channel per session, prefetch 1.
pub struct LapinConnector {
    uri: String,
}

impl LapinConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

#[async_trait]
impl BrokerConnector for LapinConnector {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        debug!("amqp channel opened");
        Ok(Box::new(LapinChannel {
            connection,
            channel,
        }))
    }
}

struct LapinChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    fn reply_to(&self) -> &str {
        DIRECT_REPLY_TO
    }

    async fn consume_replies(
        &self,
        consumer_tag: &str,
    ) -> Result<BoxStream<'static, Reply>, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                DIRECT_REPLY_TO,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        Ok(consumer
            .filter_map(|delivery| async move {
                match delivery {
                    Ok(delivery) => Some(Reply {
                        correlation_id: delivery
                            .properties
                            .correlation_id()
                            .as_ref()
                            .map(|id| id.as_str().to_string()),
                        body: delivery.data,
                    }),
                    Err(err) => {
                        warn!(error = %err, "reply consumer error");
                        None
                    }
                }
            })
            .boxed())
    }

    async fn cancel_replies(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }

    async fn publish(&self, props: &RequestProperties, body: &[u8]) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from("application/json".to_string()))
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_expiration(ShortString::from(props.expiration_ms.to_string()))
            .with_correlation_id(ShortString::from(props.correlation_id.clone()))
            .with_reply_to(ShortString::from(props.reply_to.clone()));

        // Default exchange: routing key names the worker's queue directly.
        let _confirm = self
            .channel
            .basic_publish(
                "",
                &props.routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.channel
            .close(200, "session closed")
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        self.connection
            .close(200, "session closed")
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }
}
