use crate::error::{LimiterError, Result};
use crate::rate_limit::middleware::RouteGuard;
use crate::rate_limit::types::{Tier, TierConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable whose presence selects the shared Redis backend
pub const REDIS_URL_ENV: &str = "RATE_LIMIT_REDIS_URL";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitSettings,
    /// Guarded routes served by the binary
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Route configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route path (axum syntax)
    pub path: String,
    #[serde(flatten)]
    pub guard: RouteGuard,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Redis connection URL; local-only mode when absent
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Prefix for Redis keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Bound on a single Redis round trip
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    /// Interval of the local store sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Per-tier overrides of the built-in table
    #[serde(default)]
    pub tiers: BTreeMap<Tier, TierConfig>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_key_prefix() -> String {
    crate::rate_limit::redis::DEFAULT_KEY_PREFIX.to_string()
}

fn default_backend_timeout_ms() -> u64 {
    200
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            key_prefix: default_key_prefix(),
            backend_timeout_ms: default_backend_timeout_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            tiers: BTreeMap::new(),
        }
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LimiterError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Some(url) = std::env::var(REDIS_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
        {
            self.rate_limiting.redis_url = Some(url);
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (tier, config) in &self.rate_limiting.tiers {
            config.validate(*tier)?;
        }

        if self.rate_limiting.backend_timeout_ms == 0 {
            return Err(LimiterError::Config(
                "Backend timeout must be > 0".to_string(),
            ));
        }

        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(LimiterError::Config(
                "Sweep interval must be > 0".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(LimiterError::Config(format!(
                    "Route path must start with '/': {}",
                    route.path
                )));
            }
            if route.path == "/health" || route.path == "/metrics" {
                return Err(LimiterError::Config(format!(
                    "Route path is reserved: {}",
                    route.path
                )));
            }
            if !seen.insert(route.path.as_str()) {
                return Err(LimiterError::Config(format!(
                    "Duplicate route path: {}",
                    route.path
                )));
            }
        }

        Ok(())
    }
}
