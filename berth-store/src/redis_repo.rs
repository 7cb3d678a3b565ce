use async_trait::async_trait;
use berth_core::{InventoryLock, StoreError, StoreResult};
use redis::RedisResult;
use std::time::Duration;
use tracing::{debug, info};

// Delete the key only while it still carries our holder token.
const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn acquire_lock(&self, key: &str, holder: &str, ttl_ms: u64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET NX: Only set if key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    pub async fn release_lock(&self, key: &str, holder: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// [`InventoryLock`] shared by every API instance through Redis.
#[derive(Clone)]
pub struct RedisInventoryLock {
    redis: RedisClient,
}

impl RedisInventoryLock {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl InventoryLock for RedisInventoryLock {
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration) -> StoreResult<bool> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let acquired = self
            .redis
            .acquire_lock(key, holder, ttl_ms)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if acquired {
            debug!("Inventory lock {} taken by {}", key, holder);
        }
        Ok(acquired)
    }

    async fn release(&self, key: &str, holder: &str) -> StoreResult<()> {
        let released = self
            .redis
            .release_lock(key, holder)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if !released {
            info!("Inventory lock {} had already expired for {}", key, holder);
        }
        Ok(())
    }
}
