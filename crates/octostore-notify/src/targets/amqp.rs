//! AMQP (RabbitMQ) target: publishes each event record to an exchange.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_lapin::{Manager, Pool};
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ConnectionProperties, ExchangeKind};
use tracing::debug;

use super::{ExternalTarget, event_payload};
use crate::arn::Arn;
use crate::config::{AmqpArgs, TargetKind};
use crate::error::TargetError;
use crate::event::NotificationEvent;

const POOL_SIZE: usize = 4;

pub struct AmqpTarget {
    arn: Arn,
    pool: Pool,
    exchange: String,
    routing_key: String,
    timeout: Duration,
}

impl AmqpTarget {
    /// Opens a connection and declares the exchange.
    pub async fn connect(arn: Arn, args: &AmqpArgs, timeout: Duration) -> Result<Self, TargetError> {
        let manager = Manager::new(args.url.clone(), ConnectionProperties::default());
        let pool = Pool::builder(manager)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| TargetError::InvalidConfig(format!("amqp pool: {e}")))?;

        let target = Self {
            arn,
            pool,
            exchange: args.exchange.clone(),
            routing_key: args.routing_key.clone(),
            timeout,
        };

        let channel = target.channel().await?;
        channel
            .exchange_declare(
                &args.exchange,
                exchange_kind(&args.exchange_type),
                ExchangeDeclareOptions {
                    durable: args.durable,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TargetError::Connect(format!("declare exchange {}: {e}", args.exchange))
            })?;

        debug!(exchange = %args.exchange, kind = %args.exchange_type, "Declared AMQP exchange");
        Ok(target)
    }

    async fn channel(&self) -> Result<Channel, TargetError> {
        let conn = tokio::time::timeout(self.timeout, self.pool.get())
            .await
            .map_err(|_| TargetError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| TargetError::Connect(e.to_string()))?;

        conn.create_channel()
            .await
            .map_err(|e| TargetError::Connect(format!("create channel: {e}")))
    }
}

fn exchange_kind(name: &str) -> ExchangeKind {
    match name {
        "direct" => ExchangeKind::Direct,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        _ => ExchangeKind::Fanout,
    }
}

#[async_trait]
impl ExternalTarget for AmqpTarget {
    fn arn(&self) -> &Arn {
        &self.arn
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Amqp
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TargetError> {
        let payload = serde_json::to_vec(&event_payload(event))?;
        let channel = self.channel().await?;

        channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| TargetError::Delivery(format!("publish: {e}")))?
            .await
            .map_err(|e| TargetError::Delivery(format!("publish confirmation: {e}")))?;
        Ok(())
    }
}
