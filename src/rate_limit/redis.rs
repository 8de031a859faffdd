use super::clock::{Clock, SystemClock};
use super::lua_scripts::SLIDING_WINDOW_SCRIPT;
use super::store::CounterStore;
use super::types::{CounterEntry, Identifier, Tier, TierConfig};
use crate::error::{LimiterError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{aio::ConnectionManager, Script};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

pub const DEFAULT_KEY_PREFIX: &str = "ratelimit";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Redis-backed distributed sliding-window counter
///
/// Every call is a single script round trip bounded by `timeout`; any failure
/// is reported as [`LimiterError::BackendUnavailable`] and never retried here.
pub struct RedisRateLimiter {
    /// Redis connection manager
    connection: ConnectionManager,
    script: Script,
    key_prefix: String,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisRateLimiter {
    /// Connect to Redis
    pub async fn connect(redis_url: &str, key_prefix: &str, call_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = timeout(call_timeout * 5, ConnectionManager::new(client))
            .await
            .map_err(|_| LimiterError::BackendUnavailable("Redis connect timed out".to_string()))??;

        info!(prefix = %key_prefix, "Connected to Redis rate limit backend");

        Ok(Self {
            connection,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            key_prefix: key_prefix.to_string(),
            timeout: call_timeout,
            clock: Arc::new(SystemClock),
        })
    }

    /// Use `clock` for the timestamp passed to the window script
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Convert to a Redis key
    pub fn key_for(&self, tier: Tier, identifier: &Identifier) -> String {
        format!("{}:{}:{}", self.key_prefix, tier, identifier)
    }

    /// Test Redis connection
    pub async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        timeout(
            self.timeout,
            redis::cmd("PING").query_async::<_, ()>(&mut connection),
        )
        .await
        .map_err(|_| LimiterError::BackendUnavailable("Redis ping timed out".to_string()))??;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for RedisRateLimiter {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn take(
        &self,
        tier: Tier,
        config: TierConfig,
        identifier: &Identifier,
    ) -> Result<CounterEntry> {
        let key = self.key_for(tier, identifier);
        let now_ms = self.clock.now().timestamp_millis();
        let window_ms = config.window_delta().num_milliseconds();
        let mut connection = self.connection.clone();

        let mut invocation = self.script.key(key.as_str());
        invocation.arg(config.capacity).arg(window_ms).arg(now_ms);

        let reply = timeout(
            self.timeout,
            invocation.invoke_async::<_, Vec<i64>>(&mut connection),
        )
        .await
        .map_err(|_| {
            LimiterError::BackendUnavailable(format!(
                "Redis call exceeded {}ms",
                self.timeout.as_millis()
            ))
        })??;

        let entry = parse_reply(&reply)?;
        debug!(
            key = %key,
            count = entry.count,
            reset_at = %entry.window_reset_at,
            "Sliding window check"
        );
        Ok(entry)
    }
}

/// Decode `[count, reset_at_ms]` from the script
fn parse_reply(reply: &[i64]) -> Result<CounterEntry> {
    let malformed = || LimiterError::BackendUnavailable(format!("Malformed Redis reply: {:?}", reply));

    let [count, reset_ms] = reply else {
        return Err(malformed());
    };
    let count = u32::try_from(*count).map_err(|_| malformed())?;
    if count == 0 {
        return Err(malformed());
    }
    let window_reset_at = DateTime::<Utc>::from_timestamp_millis(*reset_ms).ok_or_else(malformed)?;

    Ok(CounterEntry {
        count,
        window_reset_at,
    })
}
