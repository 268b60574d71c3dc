//! Fixed-window, per-address admission control for API paths.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

use crate::config::RateLimitConfig;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of one admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the caller's window resets.
    pub reset_after: Duration,
}

/// Counts requests per client address inside a fixed window that opens on
/// the address's first request.
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    entries: DashMap<IpAddr, Window>,
}

impl FixedWindowLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window,
            max_requests: config.max_requests,
            entries: DashMap::new(),
        }
    }

    pub fn check(&self, addr: IpAddr) -> Decision {
        self.check_at(addr, Instant::now())
    }

    /// Count one request from `addr` at `now` and decide whether to admit it.
    pub fn check_at(&self, addr: IpAddr, now: Instant) -> Decision {
        let mut entry = self.entries.entry(addr).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started));
        Decision {
            allowed: entry.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after,
        }
    }

    /// Drop windows that have expired. Returns how many were removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - self.entries.len()
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

/// `/api` and everything below it; other paths bypass the limiter.
pub fn is_limited_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

fn set_rate_headers(response: &mut Response, decision: &Decision) {
    let headers = response.headers_mut();
    let reset_secs = decision.reset_after.as_secs_f64().ceil() as u64;
    headers.insert("ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_secs));
    if !decision.allowed {
        headers.insert("retry-after", HeaderValue::from(reset_secs));
    }
}

/// Rejects with 429 before any later stage runs.
pub async fn rate_limit(
    State(limiter): State<Arc<FixedWindowLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_limited_path(request.uri().path()) {
        return next.run(request).await;
    }

    let addr = super::client_ip(&request).unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let decision = limiter.check(addr);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(
            client = %addr,
            path = %request.uri().path(),
            "rate limit exceeded"
        );
        (StatusCode::TOO_MANY_REQUESTS, Body::from(RATE_LIMIT_MESSAGE)).into_response()
    };
    set_rate_headers(&mut response, &decision);
    response
}
