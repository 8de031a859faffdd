use super::identifier;
use super::service::RateLimiterService;
use super::tiers::TierRegistry;
use super::types::{Decision, Tier, TierSelector};
use crate::error::LimiterError;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

/// Per-route guard options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteGuard {
    #[serde(default)]
    pub tier: TierSelector,
    #[serde(default)]
    pub require_auth: bool,
    /// Implies `require_auth`
    #[serde(default)]
    pub require_admin: bool,
    #[serde(default)]
    pub skip_rate_limit: bool,
}

impl RouteGuard {
    pub fn new(tier: impl Into<TierSelector>) -> Self {
        Self {
            tier: tier.into(),
            ..Self::default()
        }
    }

    pub fn require_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    pub fn require_admin(mut self) -> Self {
        self.require_admin = true;
        self
    }

    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }
}

/// Authenticated caller, placed in request extensions by the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub is_admin: bool,
}

/// Rate limiting middleware state
#[derive(Clone)]
pub struct RateLimitMiddleware {
    /// The rate limiter service
    service: Arc<RateLimiterService>,
    guard: RouteGuard,
}

impl RateLimitMiddleware {
    /// Create a new rate limiting middleware
    pub fn new(service: Arc<RateLimiterService>, guard: RouteGuard) -> Self {
        Self { service, guard }
    }

    /// Tier for a request path under this guard
    pub fn tier_for(&self, path: &str) -> Tier {
        match self.guard.tier {
            TierSelector::Fixed(tier) => tier,
            TierSelector::Auto => TierRegistry::classify(path),
        }
    }

    /// Run the rate-limit check, then the auth checks.
    ///
    /// Returns the request (with the decision attached as an extension)
    /// or a terminal response.
    pub async fn apply(&self, mut request: Request) -> Result<Request, Response> {
        let principal = request.extensions().get::<Principal>().cloned();

        let decision = if self.guard.skip_rate_limit {
            None
        } else {
            let tier = self.tier_for(request.uri().path());
            let id = identifier::resolve(
                request.headers(),
                principal.as_ref().map(|p| p.id.as_str()),
            );
            let decision = self.service.decide(tier, &id).await;

            if !decision.allowed {
                warn!(
                    tier = %tier,
                    identifier = %id,
                    path = %request.uri().path(),
                    "Rate limit exceeded"
                );
                return Err(create_rate_limit_response(&decision));
            }

            debug!(tier = %tier, remaining = decision.remaining, "Rate limit check passed");
            Some(decision)
        };

        if self.guard.require_auth || self.guard.require_admin {
            match &principal {
                None => return Err(LimiterError::Unauthorized.into_response()),
                Some(p) if self.guard.require_admin && !p.is_admin => {
                    return Err(LimiterError::Forbidden.into_response());
                }
                Some(_) => {}
            }
        }

        if let Some(decision) = decision {
            request.extensions_mut().insert(decision);
        }
        Ok(request)
    }
}

/// Create a 429 Too Many Requests response with rate limit headers
pub fn create_rate_limit_response(decision: &Decision) -> Response {
    let mut headers = HeaderMap::new();
    insert_headers(&mut headers, decision);

    let body = serde_json::json!({
        "error": RATE_LIMIT_MESSAGE,
        "retryAfter": decision.retry_after.unwrap_or(1),
    });

    (StatusCode::TOO_MANY_REQUESTS, headers, Json(body)).into_response()
}

/// Axum middleware function for rate limiting, for use with
/// `axum::middleware::from_fn_with_state`
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimitMiddleware>,
    request: Request,
    next: Next,
) -> Response {
    let request = match limiter.apply(request).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let decision = request.extensions().get::<Decision>().cloned();
    match decision {
        Some(decision) => add_rate_limit_headers(next.run(request).await, &decision),
        None => next.run(request).await,
    }
}

/// Add rate limit headers to successful responses
pub fn add_rate_limit_headers(mut response: Response, decision: &Decision) -> Response {
    insert_headers(response.headers_mut(), decision);
    response
}

fn insert_headers(headers: &mut HeaderMap, decision: &Decision) {
    for (name, value) in decision.headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}
