//! Rate limiting module
//!
//! Tiered request rate limiting backed by a shared Redis sliding-window
//! counter, degrading to process-local fixed-window counters whenever Redis
//! is not configured or fails to answer in time.
//!
//! # Features
//!
//! - Four tiers (strict, expensive, moderate, lenient) with path-based auto-classification
//! - Identifiers from the authenticated principal, `X-Forwarded-For`, or `X-Real-IP`
//! - Graceful fallback from Redis to local rate limiting
//! - Rate limit headers in responses (`X-RateLimit-*`)
//! - Optional authentication/admin checks applied after the rate-limit check
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiered_ratelimit::rate_limit::{
//!     rate_limit_middleware, RateLimitMiddleware, RateLimiterService, RouteGuard, Tier,
//!     TierRegistry,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     // Create local-only rate limiter
//!     let service = Arc::new(RateLimiterService::local_only(TierRegistry::new()));
//!
//!     let guard = RateLimitMiddleware::new(service, RouteGuard::new(Tier::Strict));
//!     let app: axum::Router = axum::Router::new()
//!         .route("/auth/login", axum::routing::post(|| async { "ok" }))
//!         .layer(axum::middleware::from_fn_with_state(guard, rate_limit_middleware));
//! }
//! ```

pub mod clock;
pub mod identifier;
pub mod local;
pub mod lua_scripts;
pub mod middleware;
pub mod redis;
pub mod service;
pub mod store;
pub mod tiers;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use local::{LocalRateLimiter, SweeperHandle};
pub use middleware::{
    add_rate_limit_headers, rate_limit_middleware, Principal, RateLimitMiddleware, RouteGuard,
};
pub use redis::RedisRateLimiter;
pub use service::RateLimiterService;
pub use store::CounterStore;
pub use tiers::TierRegistry;
pub use types::{CounterEntry, Decision, Identifier, Tier, TierConfig, TierSelector};
