/// Redis-backed challenge store
///
/// Keys expire server-side; verification uses a Lua compare-and-delete so a
/// code can be consumed at most once even under concurrent verifies.
use crate::ports::{ChallengeStore, ConsumeOutcome, StoreError};
use async_trait::async_trait;
use redis_utils::{CompareAndDelete, SharedConnectionManager};
use std::time::Duration;
use tracing::error;

#[derive(Clone)]
pub struct RedisChallengeStore {
    redis: SharedConnectionManager,
}

impl RedisChallengeStore {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        error!(error = %err, "Redis error");
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        redis_utils::set_with_expiry(&self.redis, key, value, ttl).await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(redis_utils::set_if_absent(&self.redis, key, value, ttl).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.lock().await.clone();

        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await.clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn consume_if_matches(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<ConsumeOutcome, StoreError> {
        let outcome = redis_utils::compare_and_delete(&self.redis, key, expected).await?;

        Ok(match outcome {
            CompareAndDelete::Deleted => ConsumeOutcome::Consumed,
            CompareAndDelete::Mismatch => ConsumeOutcome::Mismatch,
            CompareAndDelete::Absent => ConsumeOutcome::Absent,
        })
    }
}
