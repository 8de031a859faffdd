use super::clock::{Clock, SystemClock};
use super::store::CounterStore;
use super::types::{CounterEntry, Identifier, Tier, TierConfig};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Process-local fixed-window counters keyed by `(tier, identifier)`.
///
/// Each process enforces capacity on its own, so with N instances running in
/// fallback mode the effective global capacity is `capacity * N`.
pub struct LocalRateLimiter {
    entries: Arc<DashMap<String, CounterEntry>>,
    clock: Arc<dyn Clock>,
}

impl LocalRateLimiter {
    /// Create a new local rate limiter on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Atomic check-and-increment for one request
    pub fn take_now(&self, tier: Tier, config: TierConfig, identifier: &Identifier) -> CounterEntry {
        let now = self.clock.now();
        let key = format!("{}:{}", tier, identifier);

        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self.entries.entry(key).or_insert_with(|| CounterEntry {
            count: 0,
            window_reset_at: now,
        });

        if entry.count == 0 || now >= entry.window_reset_at {
            *entry = CounterEntry {
                count: 1,
                window_reset_at: now
                    .checked_add_signed(config.window_delta())
                    .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC),
            };
            return *entry;
        }

        if entry.count < config.capacity {
            entry.count += 1;
            return *entry;
        }

        debug!(tier = %tier, identifier = %identifier, "Local rate limit exceeded");
        CounterEntry {
            count: config.capacity.saturating_add(1),
            window_reset_at: entry.window_reset_at,
        }
    }

    /// Remove every entry whose window has passed; returns the number evicted
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.entries, self.clock.now())
    }

    /// Start the periodic sweep. The task stops when the handle is shut down or dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let entries = self.entries.clone();
        let clock = self.clock.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let evicted = sweep(&entries, clock.now());
                if evicted > 0 {
                    info!(evicted, "Local rate limiter sweep evicted expired entries");
                }
            }
        });

        SweeperHandle { task: Some(task) }
    }

    /// Number of tracked entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LocalRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn sweep(entries: &DashMap<String, CounterEntry>, now: chrono::DateTime<chrono::Utc>) -> usize {
    let mut evicted = 0;
    entries.retain(|_, entry| {
        let live = now < entry.window_reset_at;
        if !live {
            evicted += 1;
        }
        live
    });
    evicted
}

#[async_trait]
impl CounterStore for LocalRateLimiter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn take(
        &self,
        tier: Tier,
        config: TierConfig,
        identifier: &Identifier,
    ) -> Result<CounterEntry> {
        Ok(self.take_now(tier, config, identifier))
    }
}

/// Owns the background sweep task
pub struct SweeperHandle {
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the sweep and wait for the task to finish
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!("Local rate limiter sweeper stopped");
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
