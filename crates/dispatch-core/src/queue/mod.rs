//! Lazily-initialized AMQP connection cache. One `lapin::Connection` is
//! dialed on first use and reused; channels are opened per-subscriber.
//!
//! Mirrors the `Arc<RwLock<Option<T>>>` cached-connection shape used for
//! the Redis connection manager, applied here to an AMQP connection
//! instead of a Redis `ConnectionManager`.

use std::sync::Arc;

use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::RabbitConfig;
use crate::Result;

/// Lazily-dialed AMQP connection, shared across the fan-out exchange's
/// publisher and any number of consumers.
#[derive(Clone)]
pub struct QueuePool {
    config: Arc<RabbitConfig>,
    connection: Arc<RwLock<Option<Connection>>>,
}

impl QueuePool {
    pub fn new(config: RabbitConfig) -> Self {
        Self {
            config: Arc::new(config),
            connection: Arc::new(RwLock::new(None)),
        }
    }

    async fn connection(&self) -> Result<Connection> {
        {
            let guard = self.connection.read().await;
            if let Some(conn) = guard.as_ref() {
                if conn.status().connected() {
                    return Ok(conn.clone());
                }
            }
        }

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            if conn.status().connected() {
                return Ok(conn.clone());
            }
        }

        let uri = format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.config.username, self.config.password, self.config.host, self.config.port
        );
        info!(host = %self.config.host, port = self.config.port, "dialing amqp broker");
        let conn = Connection::connect(&uri, ConnectionProperties::default()).await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Declares the durable fan-out exchange and its same-named queue bound
    /// with an empty routing key, returning a channel ready to publish or
    /// consume.
    async fn prepare_channel(&self) -> Result<Channel> {
        let conn = self.connection().await?;
        let channel = conn.create_channel().await?;
        channel
            .exchange_declare(
                &self.config.queue_name,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &self.config.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &self.config.queue_name,
                &self.config.queue_name,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    /// Publishes `body` (a JSON-serialized job record) to the fan-out
    /// exchange with an empty routing key and `content-type: application/json`.
    pub async fn publish(&self, body: &[u8]) -> Result<()> {
        let channel = self.prepare_channel().await?;
        channel
            .basic_publish(
                &self.config.queue_name,
                "",
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?
            .await?;
        Ok(())
    }

    /// Opens a consumer on the bound queue with auto-ack, per §4.6.
    pub async fn consume(&self, consumer_tag: &str) -> Result<Consumer> {
        let channel = self.prepare_channel().await?;
        let consumer = channel
            .basic_consume(
                &self.config.queue_name,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }
}
