//! Policy evaluation over a counter store

use chrono::{DateTime, Utc};
use govcon_common::config::{RateLimitPolicy, RateLimitScope};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::{HitOutcome, RateLimitStore};

/// Who a request is from and what it targets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub ip: Option<IpAddr>,
    pub user: Option<String>,
    pub tenant: Option<String>,
    /// `<METHOD> <path>`
    pub endpoint: String,
}

impl RequestIdentity {
    /// Identity for a scope; `None` means the policy does not apply
    pub fn for_scope(&self, scope: RateLimitScope) -> Option<String> {
        match scope {
            RateLimitScope::Ip => self.ip.map(|ip| ip.to_string()),
            RateLimitScope::User => self.user.clone(),
            RateLimitScope::Tenant => self.tenant.clone(),
            RateLimitScope::Endpoint => Some(self.endpoint.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Carries the applicable policy with the fewest remaining requests
    Allowed { tightest: Option<HitOutcome> },
    Rejected { policy: String, outcome: HitOutcome },
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: Vec<RateLimitPolicy>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, policies: Vec<RateLimitPolicy>) -> Self {
        Self { store, policies }
    }

    pub fn policies(&self) -> &[RateLimitPolicy] {
        &self.policies
    }

    /// Store key for one policy and identity
    pub fn store_key(policy: &RateLimitPolicy, identity: &str) -> String {
        format!("{}:{}:{}", policy.name, policy.scope.as_str(), identity)
    }

    /// Count the request against every applicable policy, in order
    ///
    /// The first policy that rejects ends evaluation. A store error admits
    /// the request for that policy.
    pub async fn check(&self, request: &RequestIdentity, now: DateTime<Utc>) -> Decision {
        let mut tightest: Option<HitOutcome> = None;

        for policy in &self.policies {
            let Some(identity) = request.for_scope(policy.scope) else {
                continue;
            };
            let key = Self::store_key(policy, &identity);
            let window = Duration::from_millis(policy.window_ms);

            let outcome = match self.store.hit(&key, policy.limit, window, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(policy = %policy.name, key = %key, error = %e, "Rate limit store failed, admitting request");
                    continue;
                }
            };

            if !outcome.allowed {
                debug!(policy = %policy.name, key = %key, "Rate limit exceeded");
                return Decision::Rejected {
                    policy: policy.name.clone(),
                    outcome,
                };
            }

            if tightest.map_or(true, |t| outcome.remaining() < t.remaining()) {
                tightest = Some(outcome);
            }
        }

        Decision::Allowed { tightest }
    }

    /// Remove expired windows; store errors are logged
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        match self.store.sweep(now).await {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "Swept expired rate limit windows");
                }
                removed
            }
            Err(e) => {
                warn!(error = %e, "Rate limit sweep failed");
                0
            }
        }
    }
}

/// Sweep the limiter's store every `every`
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            limiter.sweep(Utc::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::store::{InMemoryStore, StoreError};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn policy(name: &str, scope: RateLimitScope, limit: u32, window_ms: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            name: name.to_string(),
            scope,
            limit,
            window_ms,
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn request(ip: &str) -> RequestIdentity {
        RequestIdentity {
            ip: ip.parse().ok(),
            endpoint: "GET /api/load-logs".to_string(),
            ..Default::default()
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl RateLimitStore for BrokenStore {
        async fn hit(
            &self,
            _key: &str,
            _limit: u32,
            _window: Duration,
            _now: DateTime<Utc>,
        ) -> Result<HitOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn sweep(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fourth_request_in_window_is_rejected() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            vec![policy("per-ip", RateLimitScope::Ip, 3, 1000)],
        );
        let req = request("10.0.0.1");

        for _ in 0..3 {
            assert!(matches!(limiter.check(&req, at(0)).await, Decision::Allowed { .. }));
        }

        match limiter.check(&req, at(100)).await {
            Decision::Rejected { policy, outcome } => {
                assert_eq!(policy, "per-ip");
                assert!(outcome.retry_after_secs(at(100)) <= 1);
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        match limiter.check(&req, at(1000)).await {
            Decision::Allowed { tightest: Some(outcome) } => assert_eq!(outcome.count, 1),
            other => panic!("expected fresh window, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_policy_without_identity_does_not_apply() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            vec![policy("per-user", RateLimitScope::User, 1, 60_000)],
        );
        let anonymous = request("10.0.0.1");

        for _ in 0..5 {
            assert_eq!(
                limiter.check(&anonymous, at(0)).await,
                Decision::Allowed { tightest: None }
            );
        }
    }

    #[tokio::test]
    async fn test_tightest_policy_reported() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            vec![
                policy("per-ip", RateLimitScope::Ip, 100, 60_000),
                policy("per-endpoint", RateLimitScope::Endpoint, 5, 60_000),
            ],
        );

        match limiter.check(&request("10.0.0.2"), at(0)).await {
            Decision::Allowed { tightest: Some(outcome) } => {
                assert_eq!(outcome.limit, 5);
                assert_eq!(outcome.remaining(), 4);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            vec![policy("per-ip", RateLimitScope::Ip, 1, 1000)],
        );

        for _ in 0..3 {
            assert_eq!(
                limiter.check(&request("10.0.0.3"), at(0)).await,
                Decision::Allowed { tightest: None }
            );
        }
        assert_eq!(limiter.sweep(at(0)).await, 0);
    }

    #[test]
    fn test_store_key_format() {
        let p = policy("burst", RateLimitScope::Tenant, 1, 1);
        assert_eq!(RateLimiter::store_key(&p, "acme"), "burst:tenant:acme");
    }
}
