use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return Ok(true);
        };

        let script = redis::Script::new(
            r#"
            local current = redis.call("INCR", KEYS[1])
            if current == 1 then
                redis.call("EXPIRE", KEYS[1], ARGV[1])
            end
            return current
        "#,
        );

        let current: i64 =
            script.key(key).arg(window_seconds as i64).invoke_async(&mut manager).await?;

        Ok(current <= limit as i64)
    }

    /// Per-queue-record throttle for the parse endpoint; one-minute window.
    pub(crate) async fn allow_parse_request(
        &self,
        queue_id: &str,
        limit_per_minute: u64,
    ) -> Result<bool, RedisError> {
        if limit_per_minute == 0 {
            return Ok(true);
        }
        self.rate_limit(&format!("parse-rate:{queue_id}"), limit_per_minute, 60).await
    }
}

#[cfg(test)]
mod tests {
    use super::{RedisHandle, RedisHealth};

    #[tokio::test]
    async fn disconnected_handle_allows_requests() {
        let redis = RedisHandle::new("redis://127.0.0.1:6379/1".to_string());

        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
        assert!(redis.allow_parse_request("queue-1", 1).await.expect("rate limit"));
        assert!(redis.allow_parse_request("queue-1", 1).await.expect("rate limit"));
    }

    #[tokio::test]
    async fn zero_limit_disables_throttle() {
        let redis = RedisHandle::new("redis://127.0.0.1:6379/1".to_string());
        assert!(redis.allow_parse_request("queue-1", 0).await.expect("rate limit"));
    }
}
