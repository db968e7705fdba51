//! Typed configuration consumed by the core (§6). Loaded from a TOML file
//! via `serde`+`toml`, matching the teacher's doc-commented-struct-with-
//! `Default`-impl idiom; nested per-concern structs live in submodules the
//! way the teacher splits `cache_config` out of `config.rs`.

pub mod cache_config;

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub use cache_config::CacheConfig;
use crate::selector::SelectionStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub address: IpAddr,
    /// 0 means OS-assigned.
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            address: "0.0.0.0".parse().unwrap(),
            port: 53,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    /// 1..=1000
    pub weight: u32,
    /// 1..=10
    pub priority: u32,
    /// 0.1..=30.0
    pub timeout_seconds: f64,
    pub health_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CnameFlattenerConfig {
    /// 0..=1000; unused in the current implementation (no chain-walking, see
    /// DESIGN.md), retained so the config schema matches spec §6.
    pub max_recursion: u32,
}

impl Default for CnameFlattenerConfig {
    fn default() -> Self {
        CnameFlattenerConfig { max_recursion: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_ip_rate: f64,
    pub per_ip_burst: u32,
    pub cleanup_interval_s: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            per_ip_rate: 100.0,
            per_ip_burst: 200,
            cleanup_interval_s: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_s: u64,
    pub timeout_s: f64,
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
    pub probe_name: String,
    pub probe_type: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        HealthCheckConfig {
            enabled: true,
            interval_s: 30,
            timeout_s: 3.0,
            failure_threshold: 3,
            recovery_threshold: 2,
            probe_name: "a.root-servers.net".to_string(),
            probe_type: "A".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsProxyConfig {
    pub listen: ListenConfig,
    pub upstreams: Vec<UpstreamConfig>,
    pub cname_flattener: CnameFlattenerConfig,
    pub aaaa_suppression: bool,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub health_checks: HealthCheckConfig,
    pub selection_strategy: SelectionStrategy,
    pub startup_grace_s: u64,
    /// Optional HTTP bind address for `/health`, `/metrics`, `/stats`. `None`
    /// disables the HTTP server entirely.
    pub http_listen: Option<ListenConfig>,
}

impl Default for DnsProxyConfig {
    fn default() -> Self {
        DnsProxyConfig {
            listen: ListenConfig::default(),
            upstreams: Vec::new(),
            cname_flattener: CnameFlattenerConfig::default(),
            aaaa_suppression: false,
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            health_checks: HealthCheckConfig::default(),
            selection_strategy: SelectionStrategy::RoundRobin,
            startup_grace_s: 5,
            http_listen: None,
        }
    }
}

impl DnsProxyConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, crate::error::ProxyError> {
        toml::from_str(text).map_err(|err| crate::error::ProxyError::Config(err.to_string()))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, crate::error::ProxyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Fatal at startup per §7 if there is nothing to forward to.
    pub fn validate(&self) -> Result<(), crate::error::ProxyError> {
        if self.upstreams.is_empty() {
            return Err(crate::error::ProxyError::Config(
                "at least one upstream must be configured".to_string(),
            ));
        }
        for upstream in &self.upstreams {
            if !(1..=1000).contains(&upstream.weight) {
                return Err(crate::error::ProxyError::Config(format!(
                    "upstream {} weight {} outside [1,1000]",
                    upstream.name, upstream.weight
                )));
            }
            if !(1..=10).contains(&upstream.priority) {
                return Err(crate::error::ProxyError::Config(format!(
                    "upstream {} priority {} outside [1,10]",
                    upstream.name, upstream.priority
                )));
            }
            if !(0.1..=30.0).contains(&upstream.timeout_seconds) {
                return Err(crate::error::ProxyError::Config(format!(
                    "upstream {} timeout {} outside [0.1,30.0]",
                    upstream.name, upstream.timeout_seconds
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_upstream_list() {
        let config = DnsProxyConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let text = r#"
            [listen]
            address = "0.0.0.0"
            port = 53

            [[upstreams]]
            name = "cloudflare"
            address = "1.1.1.1"
            port = 53
            weight = 1
            priority = 1
            timeout_seconds = 5.0
            health_check = true

            [cname_flattener]
            max_recursion = 10

            aaaa_suppression = false

            [cache]
            max_size = 10000
            default_ttl_s = 300
            max_ttl_s = 3600
            negative_ttl_s = 60
            cleanup_interval_s = 300
            cleanup_probability = 0.1

            [rate_limit]
            per_ip_rate = 100.0
            per_ip_burst = 200
            cleanup_interval_s = 300

            [health_checks]
            enabled = true
            interval_s = 30
            timeout_s = 3.0
            failure_threshold = 3
            recovery_threshold = 2
            probe_name = "a.root-servers.net"
            probe_type = "A"

            selection_strategy = "round_robin"
            startup_grace_s = 5
        "#;
        let config = DnsProxyConfig::from_toml_str(text).unwrap();
        assert_eq!(config.upstreams.len(), 1);
        assert!(config.validate().is_ok());
    }
}
