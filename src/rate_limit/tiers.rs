use super::types::{Tier, TierConfig};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};

/// Path fragments checked in order; the first containing match wins.
const CLASSIFICATION_RULES: &[(&str, Tier)] = &[
    ("/auth", Tier::Strict),
    ("/login", Tier::Strict),
    ("/signup", Tier::Strict),
    ("/register", Tier::Strict),
    ("/password", Tier::Strict),
    ("/import", Tier::Expensive),
    ("/export", Tier::Expensive),
    ("/ml", Tier::Expensive),
    ("/research", Tier::Expensive),
    ("/predict", Tier::Expensive),
    ("/dashboard", Tier::Lenient),
    ("/analytics", Tier::Lenient),
    ("/insights", Tier::Lenient),
];

/// Default capacity/window for a tier
pub const fn default_config(tier: Tier) -> TierConfig {
    match tier {
        Tier::Strict => TierConfig::new(5, 900),
        Tier::Expensive => TierConfig::new(10, 60),
        Tier::Moderate => TierConfig::new(100, 60),
        Tier::Lenient => TierConfig::new(300, 60),
    }
}

/// Static tier table, fixed at construction
#[derive(Debug, Clone)]
pub struct TierRegistry {
    tiers: HashMap<Tier, TierConfig>,
}

impl TierRegistry {
    /// Registry with the built-in tier table
    pub fn new() -> Self {
        let tiers = Tier::ALL
            .iter()
            .map(|&tier| (tier, default_config(tier)))
            .collect();
        Self { tiers }
    }

    /// Registry with the built-in table and validated overrides
    pub fn with_overrides(overrides: &BTreeMap<Tier, TierConfig>) -> Result<Self> {
        let mut registry = Self::new();
        for (&tier, &config) in overrides {
            config.validate(tier)?;
            registry.tiers.insert(tier, config);
        }
        Ok(registry)
    }

    pub fn config_for(&self, tier: Tier) -> TierConfig {
        self.tiers
            .get(&tier)
            .copied()
            .unwrap_or_else(|| default_config(tier))
    }

    /// Classify a request path into a tier, defaulting to moderate
    pub fn classify(path: &str) -> Tier {
        CLASSIFICATION_RULES
            .iter()
            .find(|(fragment, _)| path.contains(fragment))
            .map(|&(_, tier)| tier)
            .unwrap_or(Tier::Moderate)
    }
}

impl Default for TierRegistry {
    fn default() -> Self {
        Self::new()
    }
}
