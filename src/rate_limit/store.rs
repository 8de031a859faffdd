use super::types::{CounterEntry, Identifier, Tier, TierConfig};
use crate::error::Result;
use async_trait::async_trait;

/// A backend that performs the atomic check-and-increment for one request
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Short backend name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Count a request against `(tier, identifier)`.
    ///
    /// Denied requests are reported with `count > config.capacity`.
    async fn take(
        &self,
        tier: Tier,
        config: TierConfig,
        identifier: &Identifier,
    ) -> Result<CounterEntry>;
}
