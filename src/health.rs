//! Upstream health monitoring: sliding-window latency stats, a two-state
//! Healthy/Unhealthy machine per upstream, and a startup grace window that
//! suppresses false-positive down-marking while the process warms up.
//!
//! Generalized from the teacher's `ServerHealth` (per-upstream atomics plus
//! an EMA-smoothed response time) into a sliding-window model, since this
//! design needs both mean and median latency derived on demand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const LATENCY_WINDOW: usize = 100;

pub enum ProbeOutcome {
    Success { rtt: Duration },
    Failure,
}

struct Inner {
    latencies: VecDeque<Duration>,
}

pub struct UpstreamHealth {
    state: AtomicBool, // true = healthy
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    last_success: Mutex<Option<Instant>>,
    last_failure: Mutex<Option<Instant>>,
    inner: Mutex<Inner>,
    failure_threshold: u32,
    recovery_threshold: u32,
}

impl UpstreamHealth {
    pub fn new(failure_threshold: u32, recovery_threshold: u32) -> Self {
        UpstreamHealth {
            state: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_success: Mutex::new(None),
            last_failure: Mutex::new(None),
            inner: Mutex::new(Inner {
                latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            }),
            failure_threshold,
            recovery_threshold,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state.load(Ordering::Relaxed)
    }

    /// Ingests both active-probe and real-query outcomes (§4.5). `in_grace`
    /// suppresses the Healthy -> Unhealthy transition during startup.
    pub fn record(&self, outcome: ProbeOutcome, in_grace: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match outcome {
            ProbeOutcome::Success { rtt } => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::Relaxed);
                let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
                *self.last_success.lock() = Some(Instant::now());

                {
                    let mut inner = self.inner.lock();
                    if inner.latencies.len() >= LATENCY_WINDOW {
                        inner.latencies.pop_front();
                    }
                    inner.latencies.push_back(rtt);
                }

                if !self.is_healthy() && successes >= self.recovery_threshold {
                    self.state.store(true, Ordering::Relaxed);
                }
            }
            ProbeOutcome::Failure => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.consecutive_successes.store(0, Ordering::Relaxed);
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                *self.last_failure.lock() = Some(Instant::now());

                if self.is_healthy() && failures >= self.failure_threshold && !in_grace {
                    self.state.store(false, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.latencies.is_empty() {
            return None;
        }
        let sum: Duration = inner.latencies.iter().sum();
        Some(sum.as_secs_f64() * 1000.0 / inner.latencies.len() as f64)
    }

    pub fn median_latency_ms(&self) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.latencies.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = inner.latencies.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mid = sorted.len() / 2;
        Some(if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        })
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / total as f64
    }

    /// `[0,1]`: success rate attenuated by latency above 100ms, capped at a
    /// 0.5 penalty at 1000ms and beyond (§4.5).
    pub fn health_score(&self) -> f64 {
        let latency_penalty = match self.avg_latency_ms() {
            None => 1.0,
            Some(ms) if ms <= 100.0 => 1.0,
            Some(ms) => {
                let over = (ms - 100.0) / (1000.0 - 100.0);
                (1.0 - over.min(1.0) * 0.5).max(0.5)
            }
        };
        self.success_rate() * latency_penalty
    }

    pub fn total_queries(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> UpstreamHealthSnapshot {
        UpstreamHealthSnapshot {
            healthy: self.is_healthy(),
            total: self.total.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures(),
            avg_latency_ms: self.avg_latency_ms(),
            median_latency_ms: self.median_latency_ms(),
            success_rate: self.success_rate(),
            health_score: self.health_score(),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct UpstreamHealthSnapshot {
    pub healthy: bool,
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub avg_latency_ms: Option<f64>,
    pub median_latency_ms: Option<f64>,
    pub success_rate: f64,
    pub health_score: f64,
}

/// Tracks process start time so callers can tell whether they are still
/// inside the startup grace window (§5).
pub struct StartupGrace {
    started_at: Instant,
    grace: Duration,
}

impl StartupGrace {
    pub fn new(grace: Duration) -> Self {
        StartupGrace {
            started_at: Instant::now(),
            grace,
        }
    }

    pub fn in_grace(&self) -> bool {
        self.started_at.elapsed() < self.grace
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn becomes_unhealthy_after_threshold_failures() {
        let health = UpstreamHealth::new(3, 2);
        for _ in 0..3 {
            health.record(ProbeOutcome::Failure, false);
        }
        assert!(!health.is_healthy());
    }

    #[test]
    fn recovers_after_threshold_successes() {
        let health = UpstreamHealth::new(3, 2);
        for _ in 0..3 {
            health.record(ProbeOutcome::Failure, false);
        }
        assert!(!health.is_healthy());
        for _ in 0..2 {
            health.record(ProbeOutcome::Success { rtt: Duration::from_millis(10) }, false);
        }
        assert!(health.is_healthy());
    }

    #[test]
    fn startup_grace_suppresses_down_transition() {
        let health = UpstreamHealth::new(3, 2);
        for _ in 0..5 {
            health.record(ProbeOutcome::Failure, true);
        }
        assert!(health.is_healthy());
    }

    #[test]
    fn health_score_penalizes_latency() {
        let health = UpstreamHealth::new(3, 2);
        for _ in 0..10 {
            health.record(
                ProbeOutcome::Success {
                    rtt: Duration::from_millis(1500),
                },
                false,
            );
        }
        assert!(health.health_score() <= 0.51);
    }
}
