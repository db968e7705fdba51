use serde::{Deserialize, Serialize};

/// Cache sizing and sweep behavior (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_size: u32,
    pub default_ttl_s: u32,
    pub max_ttl_s: u32,
    pub negative_ttl_s: u32,
    pub cleanup_interval_s: u32,
    /// [0.0, 1.0]
    pub cleanup_probability: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size: 10_000,
            default_ttl_s: 300,
            max_ttl_s: 3600,
            negative_ttl_s: 60,
            cleanup_interval_s: 300,
            cleanup_probability: 0.1,
        }
    }
}
