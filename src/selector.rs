//! Upstream selection. No direct teacher analog (the teacher forwards to a
//! single configured upstream plus DNSSEC/zone fallbacks); grounded in idiom
//! on `resolver.rs`'s read-then-decide-outside-lock pattern over a health map.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::health::UpstreamHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    RoundRobin,
    LowestLatency,
    Weighted,
    Failover,
    Random,
    LeastQueries,
}

pub struct Upstream {
    pub name: String,
    pub addr: SocketAddr,
    pub weight: u32,
    pub priority: u32,
    pub timeout: std::time::Duration,
    pub health: Arc<UpstreamHealth>,
}

pub struct Selector {
    upstreams: Vec<Upstream>,
    strategy: SelectionStrategy,
    round_robin_index: AtomicU64,
}

impl Selector {
    pub fn new(upstreams: Vec<Upstream>, strategy: SelectionStrategy) -> Self {
        Selector {
            upstreams,
            strategy,
            round_robin_index: AtomicU64::new(0),
        }
    }

    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    fn healthy(&self) -> Vec<&Upstream> {
        self.upstreams.iter().filter(|u| u.health.is_healthy()).collect()
    }

    /// Picks one upstream, excluding any whose address is in `exclude` (used
    /// by the resolver's fallback loop to avoid retrying the same upstream).
    pub fn select(&self, exclude: &[SocketAddr]) -> Option<&Upstream> {
        let candidates: Vec<&Upstream> = self
            .healthy()
            .into_iter()
            .filter(|u| !exclude.contains(&u.addr))
            .collect();

        if candidates.is_empty() {
            return self.least_unhealthy(exclude);
        }

        match self.strategy {
            SelectionStrategy::RoundRobin => {
                let idx = self.round_robin_index.fetch_add(1, Ordering::Relaxed) as usize;
                candidates.get(idx % candidates.len()).copied()
            }
            SelectionStrategy::LowestLatency => candidates
                .into_iter()
                .min_by(|a, b| {
                    let la = a.health.avg_latency_ms();
                    let lb = b.health.avg_latency_ms();
                    match (la, lb) {
                        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap(),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                }),
            SelectionStrategy::Weighted => self.weighted_pick(&candidates),
            SelectionStrategy::Failover => candidates
                .into_iter()
                .min_by_key(|u| (u.priority, u.name.clone())),
            SelectionStrategy::Random => {
                let idx = rand::rng().random_range(0..candidates.len());
                candidates.get(idx).copied()
            }
            SelectionStrategy::LeastQueries => {
                candidates.into_iter().min_by_key(|u| u.health.total_queries())
            }
        }
    }

    fn weighted_pick<'a>(&self, candidates: &[&'a Upstream]) -> Option<&'a Upstream> {
        let total_weight: u32 = candidates.iter().map(|u| u.weight).sum();
        if total_weight == 0 {
            return candidates.first().copied();
        }
        let mut roll = rand::rng().random_range(0..total_weight);
        for u in candidates {
            if roll < u.weight {
                return Some(u);
            }
            roll -= u.weight;
        }
        candidates.last().copied()
    }

    /// No healthy upstream: fall back to the one with the highest health
    /// score, to keep the service best-effort rather than failing outright.
    fn least_unhealthy(&self, exclude: &[SocketAddr]) -> Option<&Upstream> {
        self.upstreams
            .iter()
            .filter(|u| !exclude.contains(&u.addr))
            .max_by(|a, b| a.health.health_score().partial_cmp(&b.health.health_score()).unwrap())
    }

    /// Returns up to `k` distinct upstreams for the resolver's fallback loop.
    pub fn select_multiple(&self, k: usize) -> Vec<&Upstream> {
        let mut chosen: Vec<&Upstream> = Vec::with_capacity(k);
        let mut exclude: Vec<SocketAddr> = Vec::with_capacity(k);
        while chosen.len() < k {
            match self.select(&exclude) {
                Some(u) if !exclude.contains(&u.addr) => {
                    exclude.push(u.addr);
                    chosen.push(u);
                }
                _ => break,
            }
        }
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::time::Duration;

    fn upstream(name: &str, addr_octet: u8, priority: u32, weight: u32) -> Upstream {
        Upstream {
            name: name.to_string(),
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, addr_octet), 53)),
            weight,
            priority,
            timeout: Duration::from_secs(5),
            health: Arc::new(UpstreamHealth::new(3, 2)),
        }
    }

    #[test]
    fn round_robin_visits_all_evenly() {
        let upstreams = vec![upstream("a", 1, 1, 1), upstream("b", 2, 1, 1), upstream("c", 3, 1, 1)];
        let selector = Selector::new(upstreams, SelectionStrategy::RoundRobin);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..30 {
            let u = selector.select(&[]).unwrap();
            *counts.entry(u.name.clone()).or_insert(0) += 1;
        }
        for count in counts.values() {
            assert_eq!(*count, 10);
        }
    }

    #[test]
    fn failover_prefers_lowest_priority() {
        let upstreams = vec![upstream("primary", 1, 1, 1), upstream("backup", 2, 2, 1)];
        let selector = Selector::new(upstreams, SelectionStrategy::Failover);
        assert_eq!(selector.select(&[]).unwrap().name, "primary");
    }

    #[test]
    fn failover_moves_on_when_primary_unhealthy() {
        let upstreams = vec![upstream("primary", 1, 1, 1), upstream("backup", 2, 2, 1)];
        for _ in 0..3 {
            upstreams[0]
                .health
                .record(crate::health::ProbeOutcome::Failure, false);
        }
        let selector = Selector::new(upstreams, SelectionStrategy::Failover);
        assert_eq!(selector.select(&[]).unwrap().name, "backup");
    }

    #[test]
    fn falls_back_to_least_unhealthy_when_all_down() {
        let upstreams = vec![upstream("a", 1, 1, 1), upstream("b", 2, 1, 1)];
        for u in &upstreams {
            for _ in 0..3 {
                u.health.record(crate::health::ProbeOutcome::Failure, false);
            }
        }
        let selector = Selector::new(upstreams, SelectionStrategy::RoundRobin);
        assert!(selector.select(&[]).is_some());
    }

    #[test]
    fn select_multiple_returns_distinct_upstreams() {
        let upstreams = vec![upstream("a", 1, 1, 1), upstream("b", 2, 1, 1), upstream("c", 3, 1, 1)];
        let selector = Selector::new(upstreams, SelectionStrategy::RoundRobin);
        let chosen = selector.select_multiple(3);
        assert_eq!(chosen.len(), 3);
        let mut addrs: Vec<_> = chosen.iter().map(|u| u.addr).collect();
        addrs.sort();
        addrs.dedup();
        assert_eq!(addrs.len(), 3);
    }
}
