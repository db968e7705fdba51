//! TTL-aware LRU cache keyed on `(name, type, class)`. Readers and writers
//! share one `DashMap`; LRU order is tracked separately under a short-held
//! `parking_lot::Mutex` so eviction never blocks lookups for long.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;

use crate::dns::{DNSResourceClass, DNSResourceType, Message};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub name: String,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl CacheKey {
    pub fn new(name: &str, qtype: DNSResourceType, qclass: DNSResourceClass) -> Self {
        CacheKey {
            name: name.to_ascii_lowercase(),
            qtype,
            qclass,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: Message,
    expiry: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expiry
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub expired_evictions: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_evictions: self.expired_evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_evictions: u64,
}

pub struct DnsCache {
    entries: DashMap<CacheKey, CacheEntry>,
    /// Front = least recently used.
    order: Mutex<Vec<CacheKey>>,
    max_size: usize,
    sweep_probability: f64,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    stats: CacheStats,
}

impl DnsCache {
    pub fn new(max_size: usize, sweep_probability: f64, sweep_interval: Duration) -> Self {
        DnsCache {
            entries: DashMap::new(),
            order: Mutex::new(Vec::new()),
            max_size,
            sweep_probability,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
            stats: CacheStats::default(),
        }
    }

    /// `get` updates LRU position on hit and, with probability `p` or if the
    /// sweep interval has elapsed, performs an incremental expired-entry
    /// sweep (§4.3). The sweep collects expired keys first and only then
    /// removes them, so no single lock is held for the O(size) portion.
    pub fn get(&self, key: &CacheKey) -> Option<Message> {
        self.maybe_sweep();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                let response = entry.response.clone();
                drop(entry);
                self.touch(key);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(response)
            }
            Some(_) => {
                drop(self.entries.remove(key));
                self.remove_from_order(key);
                self.stats.expired_evictions.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: CacheKey, response: Message, ttl: u32) {
        let expiry = Instant::now() + Duration::from_secs(ttl as u64);

        while self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict_lru();
        }

        self.entries.insert(key.clone(), CacheEntry { response, expiry });
        self.touch(&key);
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.order.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn touch(&self, key: &CacheKey) {
        let mut order = self.order.lock();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push(key.clone());
    }

    fn remove_from_order(&self, key: &CacheKey) {
        let mut order = self.order.lock();
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
    }

    fn evict_lru(&self) {
        let oldest = {
            let mut order = self.order.lock();
            if order.is_empty() {
                return;
            }
            order.remove(0)
        };
        if self.entries.remove(&oldest).is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn maybe_sweep(&self) {
        let should_sweep = {
            let mut last = self.last_sweep.lock();
            let elapsed = last.elapsed() > self.sweep_interval;
            let roll = rand::rng().random_bool(self.sweep_probability.clamp(0.0, 1.0));
            if elapsed || roll {
                *last = Instant::now();
                true
            } else {
                false
            }
        };

        if !should_sweep {
            return;
        }

        let now = Instant::now();
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        for key in &expired {
            if self.entries.remove(key).is_some() {
                self.stats.expired_evictions.fetch_add(1, Ordering::Relaxed);
                self.remove_from_order(key);
            }
        }
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        DnsCache::new(10_000, 0.1, Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{DNSHeader, RData, ResourceRecord};
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn sample_response() -> Message {
        Message {
            header: DNSHeader::default(),
            questions: vec![],
            answers: vec![ResourceRecord::new(
                "example.com",
                DNSResourceClass::IN,
                60,
                RData::A(Ipv4Addr::new(93, 184, 216, 34)),
            )],
            authorities: vec![],
            additional: vec![],
        }
    }

    #[test]
    fn idempotent_until_expiry() {
        let cache = DnsCache::new(10, 0.0, Duration::from_secs(300));
        let key = CacheKey::new("example.com", DNSResourceType::A, DNSResourceClass::IN);
        cache.set(key.clone(), sample_response(), 1);
        assert!(cache.get(&key).is_some());
        sleep(Duration::from_millis(1100));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn bounded_by_max_size() {
        let cache = DnsCache::new(2, 0.0, Duration::from_secs(300));
        for i in 0..5 {
            let key = CacheKey::new(&format!("host{i}.test"), DNSResourceType::A, DNSResourceClass::IN);
            cache.set(key, sample_response(), 300);
        }
        assert!(cache.len() <= 2);
        assert!(cache.stats().evictions.load(Ordering::Relaxed) >= 3);
    }

    #[test]
    fn distinct_type_and_class_do_not_collide() {
        let cache = DnsCache::new(10, 0.0, Duration::from_secs(300));
        let a_key = CacheKey::new("example.com", DNSResourceType::A, DNSResourceClass::IN);
        let aaaa_key = CacheKey::new("example.com", DNSResourceType::AAAA, DNSResourceClass::IN);
        cache.set(a_key.clone(), sample_response(), 300);
        assert!(cache.get(&aaaa_key).is_none());
        assert!(cache.get(&a_key).is_some());
    }

    #[test]
    fn eviction_is_least_recently_used() {
        let cache = DnsCache::new(2, 0.0, Duration::from_secs(300));
        let k1 = CacheKey::new("a.test", DNSResourceType::A, DNSResourceClass::IN);
        let k2 = CacheKey::new("b.test", DNSResourceType::A, DNSResourceClass::IN);
        cache.set(k1.clone(), sample_response(), 300);
        cache.set(k2.clone(), sample_response(), 300);
        // touch k1 so k2 becomes the LRU entry
        cache.get(&k1);
        let k3 = CacheKey::new("c.test", DNSResourceType::A, DNSResourceClass::IN);
        cache.set(k3, sample_response(), 300);
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k1).is_some());
    }
}
