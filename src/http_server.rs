//! HTTP server exposing health/metrics/stats endpoints. Trimmed from the
//! teacher's `HttpServer` (cluster registry, config-reload, and Redis-backed
//! routes dropped — no counterpart in this design): `/health`, `/metrics`,
//! `/stats`, `/cache/stats`, `/upstream/stats`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::metrics::DnsMetrics;
use crate::resolver::Resolver;

#[derive(Clone)]
struct AppState {
    resolver: Arc<Resolver>,
    metrics: Arc<DnsMetrics>,
}

pub struct HttpServer {
    resolver: Arc<Resolver>,
    metrics: Arc<DnsMetrics>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(resolver: Arc<Resolver>, metrics: Arc<DnsMetrics>, bind_addr: SocketAddr) -> Self {
        HttpServer {
            resolver,
            metrics,
            bind_addr,
        }
    }

    pub async fn start(self, mut shutdown_rx: tokio::sync::broadcast::Receiver<()>) -> std::io::Result<()> {
        let state = AppState {
            resolver: self.resolver,
            metrics: self.metrics,
        };

        let app = Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(prometheus_metrics))
            .route("/stats", get(server_stats))
            .route("/cache/stats", get(cache_stats))
            .route("/upstream/stats", get(upstream_stats))
            .with_state(state)
            .layer(CorsLayer::permissive());

        info!(bind_addr = %self.bind_addr, "HTTP server starting");
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let all_healthy = state
        .resolver
        .selector()
        .upstreams()
        .iter()
        .any(|u| u.health.is_healthy());
    let status = if all_healthy { "healthy" } else { "degraded" };
    let code = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(json!({ "status": status })))
}

async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    state
        .metrics
        .refresh(state.resolver.cache(), state.resolver.rate_limiter(), state.resolver.selector());

    match state.metrics.encode() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.resolver.cache();
    Json(json!({
        "size": cache.len(),
        "max_size": cache.max_size(),
        "stats": cache.stats().snapshot(),
    }))
}

async fn upstream_stats(State(state): State<AppState>) -> impl IntoResponse {
    let upstreams: Vec<_> = state
        .resolver
        .selector()
        .upstreams()
        .iter()
        .map(|u| {
            let stats = u.health.stats();
            json!({
                "name": u.name,
                "address": u.addr.to_string(),
                "healthy": stats.healthy,
                "total": stats.total,
                "successes": stats.successes,
                "failures": stats.failures,
                "consecutive_failures": stats.consecutive_failures,
                "avg_latency_ms": stats.avg_latency_ms,
                "median_latency_ms": stats.median_latency_ms,
                "success_rate": stats.success_rate,
                "health_score": stats.health_score,
            })
        })
        .collect();
    Json(json!({ "upstreams": upstreams }))
}

async fn server_stats(State(state): State<AppState>) -> impl IntoResponse {
    let rl_stats = state.resolver.rate_limiter().stats();
    Json(json!({
        "cache": state.resolver.cache().stats().snapshot(),
        "rate_limiter": rl_stats,
    }))
}
