use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Create a keyed rate limiter allowing `attempts` per `window_seconds` per IP.
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    let attempts = attempts.max(1);
    let period = Duration::from_millis(((window_seconds * 1000) / attempts as u64).max(1));
    let burst = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);

    Arc::new(RateLimiter::dashmap(quota))
}

/// Where a request's client address is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientIpPolicy {
    /// Honour the first `X-Forwarded-For` hop. Only enable behind a proxy
    /// that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl ClientIpPolicy {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    /// Forwarded client when trusted, else the socket peer.
    pub fn client_ip(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
        let forwarded_ip = if self.trust_forwarded_for {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        } else {
            None
        };

        forwarded_ip.or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
    }
}

/// Limiter plus the policy used to key it.
#[derive(Clone)]
pub struct IpRateLimit {
    pub limiter: IpRateLimiter,
    pub policy: ClientIpPolicy,
}

impl IpRateLimit {
    pub fn new(attempts: u32, window_seconds: u64, policy: ClientIpPolicy) -> Self {
        Self {
            limiter: create_ip_rate_limiter(attempts, window_seconds),
            policy,
        }
    }
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match rate_limit
        .policy
        .client_ip(request.headers(), request.extensions())
    {
        Some(ip) => match rate_limit.limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(ip = %ip, "Rate limit exceeded");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs().max(1)),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, middleware::from_fn_with_state, routing::post};
    use tower::ServiceExt;

    fn login_request(ip: &str, peer: [u8; 4]) -> Request {
        let mut request = Request::builder()
            .method("POST")
            .uri("/login")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((peer, 9000))));
        request
    }

    fn login_app(policy: ClientIpPolicy) -> Router {
        Router::new()
            .route("/login", post(|| async { "ok" }))
            .layer(from_fn_with_state(
                IpRateLimit::new(2, 60, policy),
                ip_rate_limit_middleware,
            ))
    }

    #[test]
    fn forwarded_header_wins_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.7, 172.16.0.1".parse().unwrap());
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));

        assert_eq!(
            ClientIpPolicy::new(true).client_ip(&headers, &extensions),
            Some("10.0.0.7".parse().unwrap())
        );
        assert_eq!(
            ClientIpPolicy::new(false).client_ip(&headers, &extensions),
            Some("127.0.0.1".parse().unwrap())
        );
        assert_eq!(
            ClientIpPolicy::new(true).client_ip(&HeaderMap::new(), &extensions),
            Some("127.0.0.1".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn limiter_rejects_after_burst() {
        let app = login_app(ClientIpPolicy::new(true));

        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(login_request("10.1.1.1", [10, 0, 0, 1]))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app
            .clone()
            .oneshot(login_request("10.1.1.1", [10, 0, 0, 1]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        // Other clients keep their own budget.
        let res = app
            .oneshot(login_request("10.1.1.2", [10, 0, 0, 1]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rotating_forwarded_header_is_ignored_when_untrusted() {
        let app = login_app(ClientIpPolicy::default());

        for spoofed in ["1.1.1.1", "2.2.2.2"] {
            let res = app
                .clone()
                .oneshot(login_request(spoofed, [192, 168, 1, 20]))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app
            .oneshot(login_request("3.3.3.3", [192, 168, 1, 20]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
