//! Redis queue target.
//!
//! `namespace` format mirrors the bucket into a hash (`bucket/key` field per
//! object, removed on delete). `access` format appends every event to a list.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime, redis::AsyncCommands};
use serde_json::json;
use time::format_description::well_known::Rfc3339;

use super::ExternalTarget;
use crate::arn::Arn;
use crate::config::{RedisArgs, TargetFormat, TargetKind};
use crate::error::TargetError;
use crate::event::NotificationEvent;

pub struct RedisTarget {
    arn: Arn,
    pool: Pool,
    key: String,
    format: TargetFormat,
}

impl RedisTarget {
    /// Builds the pool and verifies the server answers `PING` within `timeout`.
    pub async fn connect(arn: Arn, args: &RedisArgs, timeout: Duration) -> Result<Self, TargetError> {
        let mut redis_config = deadpool_redis::Config::from_url(args.connection_url());
        let mut pool_config = PoolConfig::new(4);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| TargetError::InvalidConfig(e.to_string()))?;

        let ping = async {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| TargetError::Connect(e.to_string()))?;
            let pong: String = deadpool_redis::redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| TargetError::Connect(e.to_string()))?;
            Ok::<_, TargetError>(pong)
        };
        tokio::time::timeout(timeout, ping)
            .await
            .map_err(|_| TargetError::Timeout(timeout.as_millis() as u64))??;

        tracing::debug!(arn = %arn, address = %args.address, "Redis target reachable");

        Ok(Self {
            arn,
            pool,
            key: args.key.clone(),
            format: args.format,
        })
    }
}

#[async_trait]
impl ExternalTarget for RedisTarget {
    fn arn(&self) -> &Arn {
        &self.arn
    }

    fn kind(&self) -> TargetKind {
        TargetKind::Redis
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), TargetError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| TargetError::Connect(e.to_string()))?;

        match self.format {
            TargetFormat::Namespace => {
                let field = format!("{}/{}", event.bucket(), event.object_key());
                if event.event_name.is_removal() {
                    let _: () = conn
                        .hdel(&self.key, &field)
                        .await
                        .map_err(|e| TargetError::Delivery(e.to_string()))?;
                } else {
                    let value = serde_json::to_string(&json!({ "Records": [event] }))?;
                    let _: () = conn
                        .hset(&self.key, &field, value)
                        .await
                        .map_err(|e| TargetError::Delivery(e.to_string()))?;
                }
            }
            TargetFormat::Access => {
                let event_time = event
                    .event_time
                    .format(&Rfc3339)
                    .map_err(|e| TargetError::Serialization(e.to_string()))?;
                let value = serde_json::to_string(&json!({
                    "EventTime": event_time,
                    "Records": [event],
                }))?;
                let _: () = conn
                    .rpush(&self.key, value)
                    .await
                    .map_err(|e| TargetError::Delivery(e.to_string()))?;
            }
        }
        Ok(())
    }
}
