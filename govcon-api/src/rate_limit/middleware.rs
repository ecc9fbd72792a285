//! Rate limit middleware

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::{IpAddr, SocketAddr};

use super::headers;
use super::limiter::{Decision, RequestIdentity};
use crate::error::ApiError;
use crate::AppState;

/// Count the request and reject with 429 once a policy is exhausted
///
/// Admitted responses carry the limit headers of the tightest policy.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = request_identity(
        connect_info.map(|ConnectInfo(addr)| addr.ip()),
        request.headers(),
        request.method().as_str(),
        request.uri().path(),
    );
    let now = Utc::now();

    match state.limiter.check(&identity, now).await {
        Decision::Rejected { policy, outcome } => {
            let retry_after_secs = outcome.retry_after_secs(now);
            ApiError::RateLimited {
                message: format!(
                    "Rate limit '{}' exceeded: {} requests per window. Retry after {} seconds",
                    policy, outcome.limit, retry_after_secs
                ),
                limit: outcome.limit,
                reset: outcome.reset_at.timestamp(),
                retry_after_secs,
            }
            .into_response()
        }
        Decision::Allowed { tightest } => {
            let mut response = next.run(request).await;
            if let Some(outcome) = tightest {
                let response_headers = response.headers_mut();
                response_headers.insert(headers::LIMIT, HeaderValue::from(outcome.limit));
                response_headers.insert(headers::REMAINING, HeaderValue::from(outcome.remaining()));
                response_headers.insert(headers::RESET, HeaderValue::from(outcome.reset_at.timestamp()));
            }
            response
        }
    }
}

/// Scope identities for a request
///
/// The IP comes from the connection, falling back to the first
/// `X-Forwarded-For` entry.
pub fn request_identity(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    method: &str,
    path: &str,
) -> RequestIdentity {
    let ip = peer.or_else(|| {
        header_str(headers, &headers::FORWARDED_FOR)
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok())
    });

    RequestIdentity {
        ip,
        user: header_str(headers, &headers::USER_ID).map(str::to_string),
        tenant: header_str(headers, &headers::TENANT_ID).map(str::to_string),
        endpoint: format!("{} {}", method, path),
    }
}

/// Non-empty, trimmed header value
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_peer_address() {
        let mut headers = HeaderMap::new();
        headers.insert(headers::FORWARDED_FOR, HeaderValue::from_static("203.0.113.9"));

        let identity = request_identity(Some("10.0.0.1".parse().unwrap()), &headers, "GET", "/x");
        assert_eq!(identity.ip, Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            headers::FORWARDED_FOR,
            HeaderValue::from_static(" 203.0.113.9 , 10.0.0.1"),
        );
        headers.insert(headers::USER_ID, HeaderValue::from_static("u-42"));
        headers.insert(headers::TENANT_ID, HeaderValue::from_static("  "));

        let identity = request_identity(None, &headers, "GET", "/api/load-logs");
        assert_eq!(identity.ip, Some("203.0.113.9".parse().unwrap()));
        assert_eq!(identity.user.as_deref(), Some("u-42"));
        assert_eq!(identity.tenant, None);
        assert_eq!(identity.endpoint, "GET /api/load-logs");
    }

    #[test]
    fn test_unparseable_forwarded_for_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(headers::FORWARDED_FOR, HeaderValue::from_static("unknown"));

        let identity = request_identity(None, &headers, "GET", "/");
        assert_eq!(identity.ip, None);
    }
}
