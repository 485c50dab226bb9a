//! In-memory sliding-window limiter for the login endpoint.
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Map size at which `check` drops idle keys itself.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Clone)]
pub struct RateLimiter {
    attempts: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
    max_attempts: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window,
        }
    }

    /// `max_attempts` per minute, the login default.
    pub fn per_minute(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::from_secs(60))
    }

    /// Records an attempt for `key` and reports whether it is within the limit.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        if attempts.len() >= SWEEP_THRESHOLD {
            attempts.retain(|_, history| {
                history
                    .back()
                    .is_some_and(|&at| now.duration_since(at) < self.window)
            });
        }
        let history = attempts.entry(key.to_string()).or_default();

        while history
            .front()
            .is_some_and(|&at| now.duration_since(at) >= self.window)
        {
            history.pop_front();
        }

        if history.len() < self.max_attempts {
            history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drops keys whose attempts have all aged out.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, history| {
            history.retain(|&at| now.duration_since(at) < self.window);
            !history.is_empty()
        });
        tracing::debug!("Login limiter holds {} addresses", attempts.len());
    }
}

/// Per-IP limit. Rejections use the same `{"error": kind}` body as the API.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip().to_string();
    if !limiter.check(&ip).await {
        tracing::warn!("Login rate limit exceeded for {}", ip);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limited" })),
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_is_per_key() {
        let limiter = RateLimiter::per_minute(2);

        assert!(limiter.check("10.0.0.1").await);
        assert!(limiter.check("10.0.0.1").await);
        assert!(!limiter.check("10.0.0.1").await);

        assert!(limiter.check("10.0.0.2").await);
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        assert!(limiter.check("a").await);
        assert!(!limiter.check("a").await);
        limiter.check("b").await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.check("a").await);

        limiter.cleanup().await;
        let attempts = limiter.attempts.read().await;
        assert_eq!(attempts.len(), 1);
        assert!(attempts.contains_key("a"));
    }
}
