use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo, RedisResult, Script};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connection pool backed by a single auto-reconnecting manager.
pub struct RedisPool {
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;

        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Redis connection manager ready");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }
}

/// Store `value` under `key` with a TTL, replacing any existing value.
pub async fn set_with_expiry(
    redis: &SharedConnectionManager,
    key: &str,
    value: &str,
    ttl: Duration,
) -> RedisResult<()> {
    let mut conn = redis.lock().await.clone();
    // SET with EX rejects 0, so sub-second TTLs round up
    let secs = ttl.as_secs().max(1);

    redis::cmd("SET")
        .arg(key)
        .arg(value)
        .arg("EX")
        .arg(secs)
        .query_async::<_, ()>(&mut conn)
        .await
}

/// Store `value` under `key` with a TTL only if the key does not exist yet.
///
/// Returns `true` when this call created the key.
pub async fn set_if_absent(
    redis: &SharedConnectionManager,
    key: &str,
    value: &str,
    ttl: Duration,
) -> RedisResult<bool> {
    let mut conn = redis.lock().await.clone();
    let secs = ttl.as_secs().max(1);

    // SET NX replies OK when written and nil when the key already exists
    let reply: Option<String> = redis::cmd("SET")
        .arg(key)
        .arg(value)
        .arg("NX")
        .arg("EX")
        .arg(secs)
        .query_async(&mut conn)
        .await?;

    Ok(reply.is_some())
}

/// Outcome of an atomic compare-and-delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareAndDelete {
    /// Stored value matched and the key was removed
    Deleted,
    /// Stored value differs; the key is untouched
    Mismatch,
    /// No value stored (never set or expired)
    Absent,
}

// Returns 1 on delete, -1 on mismatch, 0 when the key is missing.
const COMPARE_AND_DELETE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return -1
"#;

/// Delete `key` only if it currently holds `expected`, in one server-side step.
///
/// Two concurrent callers holding the right value can never both observe
/// `Deleted` for the same stored value.
pub async fn compare_and_delete(
    redis: &SharedConnectionManager,
    key: &str,
    expected: &str,
) -> RedisResult<CompareAndDelete> {
    let mut conn = redis.lock().await.clone();

    let outcome: i64 = Script::new(COMPARE_AND_DELETE_SCRIPT)
        .key(key)
        .arg(expected)
        .invoke_async::<_, i64>(&mut conn)
        .await?;

    debug!(key = %key, outcome, "compare-and-delete executed");

    Ok(match outcome {
        1 => CompareAndDelete::Deleted,
        0 => CompareAndDelete::Absent,
        _ => CompareAndDelete::Mismatch,
    })
}
