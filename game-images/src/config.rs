//! Configuration constants and runtime settings
//!
//! Central location for resource limits, cache policy and rate-limit
//! boundaries used throughout the crate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

// ===== Image Limits =====

/// Default ceiling for a single uploaded image (8 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// MIME prefix every stored image must carry
pub const IMAGE_MIME_PREFIX: &str = "image/";

// ===== Public Endpoint =====

/// Route prefix for the public image endpoint
pub const IMAGE_ROUTE_PREFIX: &str = "/images";

/// Seconds clients and proxies may cache an image response
pub const IMAGE_CACHE_MAX_AGE_SECS: u64 = 3600;

/// `Cache-Control` value sent with every image, matching `IMAGE_CACHE_MAX_AGE_SECS`
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=3600";

/// Body returned for every lookup miss, whatever the cause
pub const NOT_FOUND_BODY: &str = "Not Found";

// ===== Rate Limiting =====

/// Requests allowed per client address in the burst window
pub const BURST_LIMIT: usize = 60;

/// Burst window length (1 minute)
pub const BURST_WINDOW: Duration = Duration::from_secs(60);

/// Requests allowed per client address in the sustained window
pub const SUSTAINED_LIMIT: usize = 100;

/// Sustained window length (5 minutes)
pub const SUSTAINED_WINDOW: Duration = Duration::from_secs(300);

/// Number of tracked addresses above which idle entries are swept
pub const RATE_LIMIT_SWEEP_THRESHOLD: usize = 10_000;

// ===== Server =====

/// Default listen address for the binary
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default SQLite database file
pub const DEFAULT_DATABASE_PATH: &str = "data/images.db";

/// Default public base URL used when building embeddable image links
pub const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

/// Limits for the two-tier sliding-window limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub burst_limit: usize,
    pub burst_window: Duration,
    pub sustained_limit: usize,
    pub sustained_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_limit: BURST_LIMIT,
            burst_window: BURST_WINDOW,
            sustained_limit: SUSTAINED_LIMIT,
            sustained_window: SUSTAINED_WINDOW,
        }
    }
}

/// Runtime settings for the server binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub database_path: PathBuf,
    pub public_base_url: String,
    pub max_image_bytes: usize,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Build the embeddable public URL for an image id
pub fn image_url(base_url: &str, image_id: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        IMAGE_ROUTE_PREFIX,
        image_id
    )
}
