pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;

use crate::config::{LimiterConfig, RouteConfig};
use crate::error::Result;
use crate::metrics::{metrics_handler, MetricsService};
use crate::rate_limit::{
    rate_limit_middleware, Decision, RateLimitMiddleware, RateLimiterService, RouteGuard,
};
use axum::{
    extract::Extension,
    http::Uri,
    middleware::from_fn_with_state,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the HTTP app: every configured route plus a catch-all, each behind
/// its own rate-limit guard. `/health` is not limited.
pub fn build_app(service: Arc<RateLimiterService>, routes: &[RouteConfig]) -> Router {
    let guarded = |guard: RouteGuard| {
        any(guarded_handler).layer(from_fn_with_state(
            RateLimitMiddleware::new(service.clone(), guard),
            rate_limit_middleware,
        ))
    };

    let mut app = Router::new().route("/health", get(|| async { "OK" }));
    for route in routes {
        app = app.route(&route.path, guarded(route.guard));
    }

    app.route("/", guarded(RouteGuard::default()))
        .route("/*path", guarded(RouteGuard::default()))
}

async fn guarded_handler(uri: Uri, decision: Option<Extension<Decision>>) -> Json<Value> {
    Json(json!({
        "path": uri.path(),
        "remaining": decision.map(|Extension(d)| d.remaining),
    }))
}

/// Initialize and run the rate-limited server until Ctrl-C
pub async fn init_server(config: LimiterConfig) -> Result<()> {
    // Validate configuration
    config.validate()?;

    info!("Starting rate limiter");
    let service = Arc::new(RateLimiterService::from_config(&config).await?);
    info!(
        shared_backend = service.has_shared_backend(),
        "Rate limiter ready"
    );

    let sweeper = service.spawn_sweeper(Duration::from_secs(
        config.rate_limiting.sweep_interval_secs,
    ));
    let metrics = MetricsService::new()?;

    let app = build_app(service, &config.routes)
        .merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics),
        )
        .layer(TraceLayer::new_for_http());

    // Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_ratelimit=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
