use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    middleware::{from_fn, from_fn_with_state, Next},
    response::Response,
    routing::get,
    Router,
};
use http::StatusCode;
use std::sync::Arc;
use tiered_ratelimit::{
    build_app,
    config::LimiterConfig,
    error::{LimiterError, Result},
    rate_limit::{
        rate_limit_middleware, CounterEntry, CounterStore, Identifier, Principal,
        RateLimitMiddleware, RateLimiterService, RouteGuard, Tier, TierConfig, TierRegistry,
    },
};
use tower::ServiceExt;

/// Shared backend that is always down
struct UnreachableStore;

#[async_trait]
impl CounterStore for UnreachableStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn take(&self, _: Tier, _: TierConfig, _: &Identifier) -> Result<CounterEntry> {
        Err(LimiterError::BackendUnavailable("timed out".to_string()))
    }
}

fn local_service() -> Arc<RateLimiterService> {
    Arc::new(RateLimiterService::local_only(TierRegistry::new()))
}

fn get_request(uri: &str, forwarded_for: &str) -> Request {
    http::Request::builder()
        .uri(uri)
        .method("GET")
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Stand-in for the upstream session layer: trusts `x-test-user` / `x-test-admin`
async fn fake_session(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-test-user")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(id) = id {
        let is_admin = req.headers().contains_key("x-test-admin");
        req.extensions_mut().insert(Principal { id, is_admin });
    }
    next.run(req).await
}

fn guarded_router(service: Arc<RateLimiterService>, guard: RouteGuard) -> Router {
    Router::new()
        .route("/*path", get(|| async { "ok" }))
        .layer(from_fn_with_state(
            RateLimitMiddleware::new(service, guard),
            rate_limit_middleware,
        ))
        .layer(from_fn(fake_session))
}

#[tokio::test]
async fn test_strict_route_denies_sixth_request() {
    let app = build_app(local_service(), &[]);

    for expected in ["4", "3", "2", "1", "0"] {
        let response = app
            .clone()
            .oneshot(get_request("/auth/signup", "1.2.3.4, 5.6.7.8"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "5");
        assert_eq!(response.headers()["x-ratelimit-remaining"], expected);
    }

    let response = app
        .clone()
        .oneshot(get_request("/auth/signup", "1.2.3.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert!(response.headers().contains_key("x-ratelimit-reset"));

    let retry: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry > 0 && retry <= 900);

    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "Rate limit exceeded. Please try again later."
    );
    assert_eq!(body["retryAfter"], retry);
}

#[tokio::test]
async fn test_auto_classification_per_path() {
    let app = build_app(local_service(), &[]);

    let cases = [
        ("/insights/overview", "300"),
        ("/transactions", "100"),
        ("/export/csv", "10"),
        ("/auth/login", "5"),
    ];
    for (path, limit) in cases {
        let response = app
            .clone()
            .oneshot(get_request(path, "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
        assert_eq!(response.headers()["x-ratelimit-limit"], limit, "{}", path);
    }
}

#[tokio::test]
async fn test_clients_do_not_interfere() {
    let app = build_app(local_service(), &[]);

    for _ in 0..5 {
        app.clone()
            .oneshot(get_request("/auth/login", "1.1.1.1"))
            .await
            .unwrap();
    }
    let blocked = app
        .clone()
        .oneshot(get_request("/auth/login", "1.1.1.1"))
        .await
        .unwrap();
    assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);

    let other = app
        .clone()
        .oneshot(get_request("/auth/login", "2.2.2.2"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(other.headers()["x-ratelimit-remaining"], "4");
}

#[tokio::test]
async fn test_configured_route_guard() {
    let config = LimiterConfig::from_yaml(
        r#"
routes:
  - path: "/reports"
    tier: expensive
"#,
    )
    .unwrap();
    config.validate().unwrap();
    let app = build_app(local_service(), &config.routes);

    let response = app
        .clone()
        .oneshot(get_request("/reports", "10.0.0.2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "10");

    let body = body_json(response).await;
    assert_eq!(body["path"], "/reports");
    assert_eq!(body["remaining"], 9);
}

#[tokio::test]
async fn test_root_path_is_limited() {
    let app = build_app(local_service(), &[]);

    let response = app
        .clone()
        .oneshot(get_request("/", "10.0.0.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
}

#[tokio::test]
async fn test_health_is_not_limited() {
    let app = build_app(local_service(), &[]);
    for _ in 0..20 {
        let response = app
            .clone()
            .oneshot(get_request("/health", "10.0.0.3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_backend_outage_degrades_to_local_limits() {
    let service = Arc::new(RateLimiterService::with_shared(
        TierRegistry::new(),
        Arc::new(UnreachableStore),
    ));
    let app = build_app(service, &[]);

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(get_request("/auth/login", "3.3.3.3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app
        .clone()
        .oneshot(get_request("/auth/login", "3.3.3.3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_authenticated_users_get_own_bucket() {
    let app = guarded_router(local_service(), RouteGuard::new(Tier::Strict));

    // Same address, different principals.
    for user in ["alice", "bob"] {
        for _ in 0..5 {
            let mut req = get_request("/auth/session", "4.4.4.4");
            req.headers_mut()
                .insert("x-test-user", user.parse().unwrap());
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    // Anonymous traffic from that address still has its own budget.
    let response = app
        .clone()
        .oneshot(get_request("/auth/session", "4.4.4.4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_composition() {
    let app = guarded_router(local_service(), RouteGuard::default().require_admin());

    let response = app
        .clone()
        .oneshot(get_request("/admin/users", "5.5.5.5"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "Authentication required" })
    );

    let mut req = get_request("/admin/users", "5.5.5.5");
    req.headers_mut().insert("x-test-user", "bob".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "Admin access required" })
    );

    let mut req = get_request("/admin/users", "5.5.5.5");
    req.headers_mut().insert("x-test-user", "root".parse().unwrap());
    req.headers_mut().insert("x-test-admin", "1".parse().unwrap());
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unauthenticated_abuse_is_throttled_first() {
    let app = guarded_router(
        local_service(),
        RouteGuard::new(Tier::Strict).require_auth(),
    );

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(get_request("/auth/me", "6.6.6.6"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = app
        .clone()
        .oneshot(get_request("/auth/me", "6.6.6.6"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
