//! Prometheus registry scoped to the observability fields this design
//! exposes (§6): cache hits/misses/evictions, rate-limiter allowed/blocked,
//! per-upstream health/latency. Trimmed from the teacher's much larger
//! `DnsMetrics` (blocking/zone/DNSSEC counters removed — no counterpart
//! here), same `prometheus` idiom (`opts!`, `CounterVec`, `TextEncoder`).

use prometheus::{opts, Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Registry, TextEncoder};

use crate::cache::DnsCache;
use crate::rate_limiter::RateLimiter;
use crate::selector::Selector;

pub struct DnsMetrics {
    registry: Registry,

    cache_hits: IntCounter,
    cache_misses: IntCounter,
    cache_evictions: IntCounter,
    cache_size: GaugeVec,
    cache_hit_rate: Gauge,

    rate_limit_allowed: IntCounter,
    rate_limit_blocked: IntCounter,

    upstream_healthy: GaugeVec,
    upstream_avg_latency_ms: GaugeVec,
    upstream_health_score: GaugeVec,
    upstream_queries: IntCounterVec,
}

impl DnsMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cache_hits = IntCounter::with_opts(opts!("dnsproxy_cache_hits_total", "Total cache hits"))?;
        let cache_misses = IntCounter::with_opts(opts!("dnsproxy_cache_misses_total", "Total cache misses"))?;
        let cache_evictions = IntCounter::with_opts(opts!("dnsproxy_cache_evictions_total", "Total cache evictions"))?;
        let cache_size = GaugeVec::new(opts!("dnsproxy_cache_size", "Current cache entry count"), &["bound"])?;
        let cache_hit_rate = Gauge::with_opts(opts!("dnsproxy_cache_hit_rate", "Cache hit rate [0,1]"))?;

        let rate_limit_allowed =
            IntCounter::with_opts(opts!("dnsproxy_rate_limit_allowed_total", "Queries allowed by the rate limiter"))?;
        let rate_limit_blocked =
            IntCounter::with_opts(opts!("dnsproxy_rate_limit_blocked_total", "Queries blocked by the rate limiter"))?;

        let upstream_healthy = GaugeVec::new(
            opts!("dnsproxy_upstream_healthy", "1 if the upstream is healthy, else 0"),
            &["upstream"],
        )?;
        let upstream_avg_latency_ms = GaugeVec::new(
            opts!("dnsproxy_upstream_avg_latency_ms", "Average upstream latency over the sliding window"),
            &["upstream"],
        )?;
        let upstream_health_score = GaugeVec::new(
            opts!("dnsproxy_upstream_health_score", "Upstream health score [0,1]"),
            &["upstream"],
        )?;
        let upstream_queries = IntCounterVec::new(
            opts!("dnsproxy_upstream_queries_total", "Total queries sent to this upstream"),
            &["upstream"],
        )?;

        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_evictions.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;
        registry.register(Box::new(cache_hit_rate.clone()))?;
        registry.register(Box::new(rate_limit_allowed.clone()))?;
        registry.register(Box::new(rate_limit_blocked.clone()))?;
        registry.register(Box::new(upstream_healthy.clone()))?;
        registry.register(Box::new(upstream_avg_latency_ms.clone()))?;
        registry.register(Box::new(upstream_health_score.clone()))?;
        registry.register(Box::new(upstream_queries.clone()))?;

        Ok(DnsMetrics {
            registry,
            cache_hits,
            cache_misses,
            cache_evictions,
            cache_size,
            cache_hit_rate,
            rate_limit_allowed,
            rate_limit_blocked,
            upstream_healthy,
            upstream_avg_latency_ms,
            upstream_health_score,
            upstream_queries,
        })
    }

    /// Pulls current values from the cache, rate limiter, and selector into
    /// the registered gauges/counters. Called before each `/metrics` scrape.
    pub fn refresh(&self, cache: &DnsCache, rate_limiter: &RateLimiter, selector: &Selector) {
        let cache_stats = cache.stats().snapshot();
        self.cache_hits.reset();
        self.cache_hits.inc_by(cache_stats.hits);
        self.cache_misses.reset();
        self.cache_misses.inc_by(cache_stats.misses);
        self.cache_evictions.reset();
        self.cache_evictions.inc_by(cache_stats.evictions);
        self.cache_size.with_label_values(&["current"]).set(cache.len() as f64);
        self.cache_size.with_label_values(&["max"]).set(cache.max_size() as f64);
        self.cache_hit_rate.set(cache.stats().hit_rate());

        let rl_stats = rate_limiter.stats();
        self.rate_limit_allowed.reset();
        self.rate_limit_allowed.inc_by(rl_stats.allowed);
        self.rate_limit_blocked.reset();
        self.rate_limit_blocked.inc_by(rl_stats.blocked_total);

        for upstream in selector.upstreams() {
            let snapshot = upstream.health.stats();
            self.upstream_healthy
                .with_label_values(&[&upstream.name])
                .set(if snapshot.healthy { 1.0 } else { 0.0 });
            self.upstream_avg_latency_ms
                .with_label_values(&[&upstream.name])
                .set(snapshot.avg_latency_ms.unwrap_or(0.0));
            self.upstream_health_score
                .with_label_values(&[&upstream.name])
                .set(snapshot.health_score);
            self.upstream_queries.with_label_values(&[&upstream.name]).reset();
            self.upstream_queries
                .with_label_values(&[&upstream.name])
                .inc_by(snapshot.total);
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }
}
