//! Redis pub/sub bus.
//!
//! Publishes with `PUBLISH` over a `ConnectionManager`, which reconnects on
//! its own after a dropped connection.

use std::time::Duration;

use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;

use crate::application::ports::{BusError, DistributionBus};

/// Redis-backed distribution bus.
#[derive(Clone)]
pub struct RedisBus {
    manager: ConnectionManager,
}

impl RedisBus {
    /// Open a managed connection and check it answers `PING` within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::ConnectionError` if the URL is invalid, the server
    /// is unreachable, or it does not answer in time.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, BusError> {
        let client = Client::open(url).map_err(connection_error)?;

        let manager = tokio::time::timeout(timeout, async {
            let mut manager = ConnectionManager::new(client).await?;
            redis::cmd("PING")
                .query_async::<String>(&mut manager)
                .await?;
            Ok::<_, redis::RedisError>(manager)
        })
        .await
        .map_err(|_| BusError::ConnectionError {
            message: format!("no answer within {}ms", timeout.as_millis()),
        })?
        .map_err(connection_error)?;

        tracing::info!("Connected to Redis distribution bus");
        Ok(Self { manager })
    }
}

#[async_trait]
impl DistributionBus for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut connection = self.manager.clone();
        let receivers = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<i64>(&mut connection)
            .await
            .map_err(|e| BusError::PublishFailed {
                message: e.to_string(),
            })?;
        tracing::trace!(channel, receivers, "Published to bus");
        Ok(())
    }
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus").finish_non_exhaustive()
    }
}

fn connection_error(e: redis::RedisError) -> BusError {
    BusError::ConnectionError {
        message: e.to_string(),
    }
}
