//! Rate Limiting Middleware
//!
//! Token bucket rate limiting keyed by the client address. The socket peer
//! is authoritative; `X-Forwarded-For` is only read when that peer is one of
//! the configured trusted proxies.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ErrorResponse;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Window duration
    pub window: Duration,
    /// Exempt client addresses
    pub exempt_ips: Vec<IpAddr>,
    /// Peers allowed to report the client address via `X-Forwarded-For`
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(100, Duration::from_secs(15 * 60))
    }
}

impl RateLimitConfig {
    /// Loopback callers are exempt, no proxy is trusted
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window: window.max(Duration::from_millis(1)),
            exempt_ips: vec![
                IpAddr::from([127, 0, 0, 1]),
                IpAddr::from([0u16, 0, 0, 0, 0, 0, 0, 1]),
            ],
            trusted_proxies: Vec::new(),
        }
    }

    pub fn without_exemptions(mut self) -> Self {
        self.exempt_ips.clear();
        self
    }

    pub fn with_trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        self.trusted_proxies = proxies.into_iter().collect();
        self
    }

    pub fn is_ip_exempt(&self, ip: &IpAddr) -> bool {
        self.exempt_ips.contains(ip)
    }

    pub fn is_trusted_proxy(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    /// Tokens regained per second
    fn tokens_per_sec(&self) -> f64 {
        self.max_requests as f64 / self.window.as_secs_f64()
    }
}

/// Per-client allowance. Refill happens lazily in [`RateLimiter::check`].
#[derive(Debug)]
struct Allowance {
    tokens: f64,
    updated_at: Instant,
}

/// Outcome of one bucket check
#[derive(Debug, Clone, Copy)]
struct Decision {
    allowed: bool,
    remaining: u32,
    retry_after: Duration,
}

/// Rate limiter state
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    allowances: Arc<RwLock<HashMap<String, Allowance>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            allowances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    async fn check(&self, key: &str) -> Decision {
        let capacity = self.config.max_requests as f64;
        let per_sec = self.config.tokens_per_sec();
        let now = Instant::now();

        let mut allowances = self.allowances.write().await;
        let allowance = allowances.entry(key.to_string()).or_insert(Allowance {
            tokens: capacity,
            updated_at: now,
        });

        let regained = now.duration_since(allowance.updated_at).as_secs_f64() * per_sec;
        allowance.tokens = (allowance.tokens + regained).min(capacity);
        allowance.updated_at = now;

        let allowed = allowance.tokens >= 1.0;
        if allowed {
            allowance.tokens -= 1.0;
        }

        let retry_after = if allowance.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - allowance.tokens) / per_sec)
        };

        Decision {
            allowed,
            remaining: allowance.tokens as u32,
            retry_after,
        }
    }

    /// Drop allowances idle for more than two windows
    pub async fn cleanup(&self) {
        let mut allowances = self.allowances.write().await;
        let idle_for = self.config.window * 2;
        allowances.retain(|_, allowance| allowance.updated_at.elapsed() < idle_for);
    }
}

/// Rate limit error
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after: Duration,
    pub limit: u32,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        // Round up so a client never retries too early
        let retry_secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        let body = ErrorResponse::new(
            "RATE_LIMITED",
            format!("Too many requests, retry after {} seconds", retry_secs),
        );

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
        headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_secs));
        response
    }
}

/// Resolve the address a request is charged to.
///
/// Walks `X-Forwarded-For` from the right while the hop is a trusted proxy,
/// so a client cannot pick its own key by prepending entries.
fn client_ip(config: &RateLimitConfig, peer: Option<IpAddr>, headers: &HeaderMap) -> Option<IpAddr> {
    let peer = peer?;
    if !config.is_trusted_proxy(&peer) {
        return Some(peer);
    }

    let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) else {
        return Some(peer);
    };

    let mut client = peer;
    for hop in forwarded.rsplit(',') {
        match hop.trim().parse::<IpAddr>() {
            Ok(ip) => {
                client = ip;
                if !config.is_trusted_proxy(&ip) {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    Some(client)
}

/// Rate limit middleware
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let peer = connect_info.map(|ci| ci.0.ip());
    let ip = client_ip(&limiter.config, peer, request.headers());

    if let Some(ip) = ip {
        if limiter.config.is_ip_exempt(&ip) {
            return Ok(next.run(request).await);
        }
    }

    let key = match ip {
        Some(ip) => format!("ip:{}", ip),
        None => "global".to_string(),
    };

    let decision = limiter.check(&key).await;
    if !decision.allowed {
        debug!(client = %key, "Rate limit exceeded");
        return Err(RateLimitError {
            retry_after: decision.retry_after,
            limit: limiter.config.max_requests,
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.config.max_requests));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));

    Ok(response)
}

/// Start background cleanup task
pub fn start_cleanup_task(limiter: RateLimiter, interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_loopback_exempt() {
        let config = RateLimitConfig::default();

        assert!(config.is_ip_exempt(&ip("127.0.0.1")));
        assert!(config.is_ip_exempt(&ip("::1")));
        assert!(!config.is_ip_exempt(&ip("192.168.1.1")));
        assert!(!config.without_exemptions().is_ip_exempt(&ip("127.0.0.1")));
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(RateLimitConfig::new(5, Duration::from_secs(900)));

        for i in 0..5 {
            let decision = limiter.check("ip:10.0.0.1").await;
            assert!(decision.allowed, "Request {} should be allowed", i);
            assert_eq!(decision.remaining, 4 - i as u32);
        }

        let decision = limiter.check("ip:10.0.0.1").await;
        assert!(!decision.allowed);
        assert!(decision.retry_after > Duration::ZERO);

        // Other clients have their own allowance
        assert!(limiter.check("ip:10.0.0.2").await.allowed);
    }

    #[tokio::test]
    async fn test_allowance_refills_over_time() {
        let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_millis(100)));

        assert!(limiter.check("ip:10.0.0.1").await.allowed);
        assert!(limiter.check("ip:10.0.0.1").await.allowed);
        assert!(!limiter.check("ip:10.0.0.1").await.allowed);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.check("ip:10.0.0.1").await.allowed);
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_header() {
        let config = RateLimitConfig::default();
        let peer = Some(ip("198.51.100.4"));

        for spoofed in ["127.0.0.1", "203.0.113.7", "10.0.0.1, 10.0.0.2"] {
            let resolved = client_ip(&config, peer, &forwarded(spoofed));
            assert_eq!(resolved, peer);
            assert!(!config.is_ip_exempt(&resolved.unwrap()));
        }
    }

    #[test]
    fn test_trusted_proxy_forwards_client() {
        let config = RateLimitConfig::default().with_trusted_proxies([ip("10.0.0.2"), ip("10.0.0.3")]);
        let proxy = Some(ip("10.0.0.2"));

        assert_eq!(
            client_ip(&config, proxy, &forwarded("203.0.113.7")),
            Some(ip("203.0.113.7"))
        );
        // Entries left of the first untrusted hop are client-controlled
        assert_eq!(
            client_ip(&config, proxy, &forwarded("127.0.0.1, 203.0.113.7, 10.0.0.3")),
            Some(ip("203.0.113.7"))
        );
        assert_eq!(client_ip(&config, proxy, &HeaderMap::new()), proxy);
        assert_eq!(client_ip(&config, proxy, &forwarded("not-an-ip")), proxy);
    }

    #[test]
    fn test_missing_peer_has_no_client_ip() {
        let config = RateLimitConfig::default().with_trusted_proxies([ip("10.0.0.2")]);
        assert_eq!(client_ip(&config, None, &forwarded("203.0.113.7")), None);
    }
}
