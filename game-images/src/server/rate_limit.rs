//! Two-tier sliding-window rate limiting keyed by client address.
//!
//! A short burst window and a longer sustained window are tracked
//! independently per IP. A request is admitted only when both windows have
//! room; rejected requests are not recorded, so a throttled client regains
//! access as soon as its oldest admitted request ages out.

use crate::config::{RateLimitConfig, RATE_LIMIT_SWEEP_THRESHOLD};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Admitted request times for one window
#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<Instant>,
}

impl Window {
    /// Drop hits that have aged out of `period`
    fn prune(&mut self, now: Instant, period: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.saturating_duration_since(oldest) >= period {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until a slot frees up, or `None` if one is free now
    fn wait_time(&self, now: Instant, limit: usize, period: Duration) -> Option<Duration> {
        if self.hits.len() < limit {
            return None;
        }

        let wait = self
            .hits
            .front()
            .map(|&oldest| (oldest + period).saturating_duration_since(now))
            .unwrap_or(period);
        Some(wait)
    }
}

#[derive(Debug, Default)]
struct ClientWindows {
    burst: Window,
    sustained: Window,
}

impl ClientWindows {
    fn is_idle(&self) -> bool {
        self.burst.hits.is_empty() && self.sustained.hits.is_empty()
    }
}

#[derive(Debug)]
struct Clients {
    windows: HashMap<IpAddr, ClientWindows>,
    last_sweep: Instant,
}

/// Per-address limiter enforcing a burst and a sustained window
pub struct RateLimiter {
    config: RateLimitConfig,
    sweep_threshold: usize,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_sweep_threshold(config, RATE_LIMIT_SWEEP_THRESHOLD)
    }

    fn with_sweep_threshold(config: RateLimitConfig, sweep_threshold: usize) -> Self {
        Self {
            config,
            sweep_threshold,
            clients: Mutex::new(Clients {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Check and record a request from `client` arriving now
    pub async fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now()).await
    }

    /// Check and record a request from `client` arriving at `now`
    pub async fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        let config = &self.config;
        let mut clients = self.clients.lock().await;

        // At most one sweep per burst window, however many addresses are live.
        if clients.windows.len() > self.sweep_threshold
            && now.saturating_duration_since(clients.last_sweep) >= config.burst_window
        {
            sweep(&mut clients.windows, now, config);
            clients.last_sweep = now;
        }

        let windows = clients.windows.entry(client).or_default();
        windows.burst.prune(now, config.burst_window);
        windows.sustained.prune(now, config.sustained_window);

        let burst_wait = windows
            .burst
            .wait_time(now, config.burst_limit, config.burst_window);
        let sustained_wait = windows
            .sustained
            .wait_time(now, config.sustained_limit, config.sustained_window);

        // The stricter violated limit decides how long the client waits.
        match burst_wait.into_iter().chain(sustained_wait).max() {
            Some(retry_after) => Decision::Limited { retry_after },
            None => {
                windows.burst.hits.push_back(now);
                windows.sustained.hits.push_back(now);
                Decision::Allowed
            }
        }
    }

    /// Number of addresses currently tracked
    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.windows.len()
    }
}

/// Forget addresses whose windows have fully drained
fn sweep(clients: &mut HashMap<IpAddr, ClientWindows>, now: Instant, config: &RateLimitConfig) {
    let before = clients.len();
    clients.retain(|_, windows| {
        windows.burst.prune(now, config.burst_window);
        windows.sustained.prune(now, config.sustained_window);
        !windows.is_idle()
    });
    debug!(before, after = clients.len(), "swept idle rate-limit entries");
}

/// Whole seconds for a `Retry-After` header, never less than one
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Middleware rejecting over-limit clients with 429 before any lookup
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(addr.ip()).await {
        Decision::Allowed => next.run(request).await,
        Decision::Limited { retry_after } => {
            let secs = retry_after_secs(retry_after);
            warn!(client = %addr.ip(), retry_after_secs = secs, "rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                "Too Many Requests",
            )
                .into_response()
        }
    }
}
