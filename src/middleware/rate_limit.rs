use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(1);
/// Stale per-client windows are dropped once the table grows past this.
const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct WindowState {
    start: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Global,
    PerClient,
}

/// Fixed one-second window limiter, either shared by all callers or kept
/// separately per client address.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    scope: Scope,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    pub fn global(rps: u32) -> Self {
        Self::new(rps, Scope::Global)
    }

    pub fn per_client(rps: u32) -> Self {
        Self::new(rps, Scope::PerClient)
    }

    fn new(rps: u32, scope: Scope) -> Self {
        Self {
            rps: rps.max(1),
            scope,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowState>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.lock();
        if windows.len() > MAX_TRACKED_CLIENTS {
            windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        }
        let window = windows.entry(key.to_string()).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }

    fn key(&self, req: &Request<Body>) -> String {
        match self.scope {
            Scope::Global => "*".to_string(),
            Scope::PerClient => client_key(
                req.headers(),
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| *addr),
            ),
        }
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = limiter.key(&req);
    if !limiter.allow_at(&key, Instant::now()) {
        tracing::debug!(client = %key, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limit_exceeded", "message": "Too many requests" })),
        )
            .into_response();
    }
    next.run(req).await
}
