use super::clock::{Clock, SystemClock};
use super::local::{LocalRateLimiter, SweeperHandle};
use super::redis::RedisRateLimiter;
use super::store::CounterStore;
use super::tiers::TierRegistry;
use super::types::{CounterEntry, Decision, Identifier, Tier, TierConfig};
use crate::config::LimiterConfig;
use crate::error::Result;
use crate::metrics::{record_backend_failure, record_decision};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rate limiter service that handles both shared and local rate limiting
///
/// The shared store is tried first when configured; any backend failure is
/// logged and the request is counted against the local store instead.
pub struct RateLimiterService {
    registry: TierRegistry,
    /// Redis-backed distributed rate limiter (optional)
    shared: Option<Arc<dyn CounterStore>>,
    /// Local (in-memory) rate limiter
    local: Arc<LocalRateLimiter>,
    clock: Arc<dyn Clock>,
}

impl RateLimiterService {
    /// Create a new rate limiter service with local-only rate limiting
    pub fn local_only(registry: TierRegistry) -> Self {
        info!("Initializing local-only rate limiter");
        Self::build(registry, None, Arc::new(SystemClock))
    }

    /// Create a service with a shared backend and local fallback
    pub fn with_shared(registry: TierRegistry, shared: Arc<dyn CounterStore>) -> Self {
        info!(backend = shared.name(), "Initializing rate limiter with shared backend");
        Self::build(registry, Some(shared), Arc::new(SystemClock))
    }

    /// Build from configuration. Redis is used when a URL is configured; an
    /// unreachable Redis at startup leaves the service in local-only mode.
    pub async fn from_config(config: &LimiterConfig) -> Result<Self> {
        let settings = &config.rate_limiting;
        let registry = TierRegistry::with_overrides(&settings.tiers)?;

        let Some(url) = settings.redis_url.as_deref() else {
            return Ok(Self::local_only(registry));
        };

        let call_timeout = Duration::from_millis(settings.backend_timeout_ms);
        match RedisRateLimiter::connect(url, &settings.key_prefix, call_timeout).await {
            Ok(redis) => {
                if let Err(e) = redis.ping().await {
                    warn!("Redis ping failed: {}, requests will fall back to local limits", e);
                }
                Ok(Self::with_shared(registry, Arc::new(redis)))
            }
            Err(e) => {
                warn!("Redis connection failed: {}, falling back to local rate limiter", e);
                Ok(Self::local_only(registry))
            }
        }
    }

    /// Replace the time source used for local windows and decision mapping
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self::build(self.registry, self.shared, clock)
    }

    fn build(
        registry: TierRegistry,
        shared: Option<Arc<dyn CounterStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            shared,
            local: Arc::new(LocalRateLimiter::with_clock(clock.clone())),
            clock,
        }
    }

    /// Decide whether a request from `identifier` may proceed under `tier`
    pub async fn decide(&self, tier: Tier, identifier: &Identifier) -> Decision {
        let config = self.registry.config_for(tier);

        if let Some(shared) = &self.shared {
            match shared.take(tier, config, identifier).await {
                Ok(entry) => {
                    return self.record(tier, shared.name(), config, entry);
                }
                Err(e) => {
                    warn!(
                        tier = %tier,
                        backend = shared.name(),
                        "Shared rate limit check failed, using local fallback: {}",
                        e
                    );
                    record_backend_failure(shared.name());
                }
            }
        }

        let entry = self.local.take_now(tier, config, identifier);
        self.record(tier, "local", config, entry)
    }

    fn record(
        &self,
        tier: Tier,
        backend: &'static str,
        config: TierConfig,
        entry: CounterEntry,
    ) -> Decision {
        let decision = Decision::from_entry(entry, config.capacity, self.clock.now());

        debug!(
            tier = %tier,
            backend,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Rate limit decision"
        );
        record_decision(tier.as_str(), backend, decision.allowed);

        decision
    }

    /// Start the local store's periodic sweep
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        self.local.spawn_sweeper(interval)
    }

    pub fn registry(&self) -> &TierRegistry {
        &self.registry
    }

    /// Whether a shared backend is configured
    pub fn has_shared_backend(&self) -> bool {
        self.shared.is_some()
    }

    /// Get the local rate limiter
    pub fn local(&self) -> &Arc<LocalRateLimiter> {
        &self.local
    }
}
