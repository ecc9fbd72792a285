//! Fixed-window rate limiting
//!
//! Policies from `[api.rate_limits]` are counted in a pluggable
//! [`RateLimitStore`]; the middleware turns a rejection into a 429.

pub mod limiter;
pub mod middleware;
pub mod store;

pub use limiter::{spawn_sweeper, Decision, RateLimiter, RequestIdentity};
pub use middleware::rate_limit_middleware;
pub use store::{HitOutcome, InMemoryStore, RateLimitStore, StoreError};

/// Response header names
pub mod headers {
    use axum::http::HeaderName;

    pub const LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
    pub const REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
    pub const RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");
    pub const RETRY_AFTER: HeaderName = axum::http::header::RETRY_AFTER;
    pub const USER_ID: HeaderName = HeaderName::from_static("x-user-id");
    pub const TENANT_ID: HeaderName = HeaderName::from_static("x-tenant-id");
    pub const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
}
