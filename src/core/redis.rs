use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

const RATE_LIMIT_SCRIPT: &str = r#"
local current = redis.call("INCR", KEYS[1])
if current == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return current
"#;

/// Shared handle to an optional Redis connection. The portal only leans on
/// Redis for rate limiting, so a missing connection downgrades features
/// instead of failing requests.
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
        let client = Client::open(self.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        self.manager.write().await.replace(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        self.manager.write().await.take();
    }

    async fn current(&self) -> Option<ConnectionManager> {
        self.manager.read().await.clone()
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut manager) = self.current().await else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// Fixed-window counter. Degrades open: without a connection every
    /// request is allowed rather than locking users out.
    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let Some(mut manager) = self.current().await else {
            return Ok(true);
        };

        // INCR and EXPIRE run in one script so the counter cannot get
        // stuck without a TTL.
        let count: i64 = redis::Script::new(RATE_LIMIT_SCRIPT)
            .key(key)
            .arg(window_seconds as i64)
            .invoke_async(&mut manager)
            .await?;

        Ok(count <= limit as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::{RedisHandle, RedisHealth};

    #[tokio::test]
    async fn rate_limit_allows_when_disconnected() {
        let redis = RedisHandle::new("redis://localhost:6399/0".to_string());

        let allowed = redis.rate_limit("login:nobody", 1, 5).await.expect("rate limit");
        assert!(allowed);

        let allowed_again = redis.rate_limit("login:nobody", 1, 5).await.expect("rate limit");
        assert!(allowed_again);
    }

    #[tokio::test]
    async fn health_reports_disconnected_before_connect() {
        let redis = RedisHandle::new("redis://localhost:6399/0".to_string());
        assert!(matches!(redis.health().await, RedisHealth::Disconnected));
    }
}
