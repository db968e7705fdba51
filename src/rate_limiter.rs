//! Per-client token-bucket rate limiting. `governor`'s GCRA implementation
//! does not expose the raw token/burst/rate state this design needs to
//! observe and to reclaim idle buckets, so the bucket is hand-rolled here;
//! the concurrent per-IP map (DashMap + parking_lot) keeps the teacher's
//! idiom for shared mutable per-client state.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    burst: u32,
    rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(burst: u32, rate: f64) -> Self {
        TokenBucket {
            tokens: burst as f64,
            burst,
            rate,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst as f64);
        self.last_update = now;
    }

    fn is_idle(&self) -> bool {
        self.tokens >= self.burst as f64
    }
}

#[derive(Debug, Default)]
pub struct RateLimiterStats {
    pub allowed: AtomicU64,
    pub blocked_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimiterStatsSnapshot {
    pub allowed: u64,
    pub blocked_total: u64,
    pub active_buckets: usize,
}

pub struct RateLimiter {
    buckets: DashMap<IpAddr, Mutex<TokenBucket>>,
    blocked_per_ip: DashMap<IpAddr, AtomicU64>,
    rate: f64,
    burst: u32,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    stats: RateLimiterStats,
}

impl RateLimiter {
    pub fn new(rate: f64, burst: u32, sweep_interval: Duration) -> Self {
        RateLimiter {
            buckets: DashMap::new(),
            blocked_per_ip: DashMap::new(),
            rate,
            burst,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
            stats: RateLimiterStats::default(),
        }
    }

    /// §4.4: sweep idle buckets, then refill-and-consume one token for `ip`.
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        self.maybe_sweep();

        let bucket = self
            .buckets
            .entry(ip)
            .or_insert_with(|| Mutex::new(TokenBucket::new(self.burst, self.rate)));
        let mut bucket = bucket.lock();
        bucket.refill(Instant::now());

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            self.stats.allowed.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.stats.blocked_total.fetch_add(1, Ordering::Relaxed);
            self.blocked_per_ip
                .entry(ip)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn blocked_for(&self, ip: IpAddr) -> u64 {
        self.blocked_per_ip
            .get(&ip)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn stats(&self) -> RateLimiterStatsSnapshot {
        RateLimiterStatsSnapshot {
            allowed: self.stats.allowed.load(Ordering::Relaxed),
            blocked_total: self.stats.blocked_total.load(Ordering::Relaxed),
            active_buckets: self.buckets.len(),
        }
    }

    fn maybe_sweep(&self) {
        let mut last = self.last_sweep.lock();
        if last.elapsed() <= self.sweep_interval {
            return;
        }
        *last = Instant::now();
        drop(last);

        let now = Instant::now();
        self.buckets.retain(|_, bucket| {
            let mut b = bucket.lock();
            b.refill(now);
            !b.is_idle()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn allows_up_to_burst_then_blocks() {
        let limiter = RateLimiter::new(10.0, 10, Duration::from_secs(300));
        let client = ip(1);
        for _ in 0..10 {
            assert!(limiter.is_allowed(client));
        }
        assert!(!limiter.is_allowed(client));
        assert_eq!(limiter.blocked_for(client), 1);
    }

    #[test]
    fn clients_are_isolated() {
        let limiter = RateLimiter::new(1.0, 2, Duration::from_secs(300));
        let a = ip(1);
        let b = ip(2);
        assert!(limiter.is_allowed(a));
        assert!(limiter.is_allowed(a));
        assert!(!limiter.is_allowed(a));
        // b's burst is untouched by a's exhaustion
        assert!(limiter.is_allowed(b));
        assert!(limiter.is_allowed(b));
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = RateLimiter::new(100.0, 1, Duration::from_secs(300));
        let client = ip(1);
        assert!(limiter.is_allowed(client));
        assert!(!limiter.is_allowed(client));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.is_allowed(client));
    }

    #[test]
    fn idle_bucket_is_reclaimed_on_sweep() {
        let limiter = RateLimiter::new(10.0, 10, Duration::from_millis(1));
        let client = ip(1);
        limiter.is_allowed(client);
        std::thread::sleep(Duration::from_millis(5));
        // bucket refills to full (idle) before the next sweep fires
        limiter.maybe_sweep();
        assert_eq!(limiter.buckets.len(), 0);
    }
}
