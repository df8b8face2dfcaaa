//! Fixed-window rate limiting with per-class policies.
//!
//! # Design Decisions
//! - One bucket per (client key, policy class), created lazily
//! - Buckets live in a sharded map: a check locks one shard for the duration of
//!   a read-modify-write, so unrelated clients rarely contend
//! - State is process-local; N instances enforce roughly N times the limit
//! - Policies can be swapped at runtime; existing buckets adopt the new
//!   ceiling on their next check

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audit::{AuditActor, RequestOrigin};
use crate::config::{RateLimitConfig, WindowPolicy};
use crate::error::{retry_after_secs, GateError};
use crate::identity::ClaimedRole;
use crate::observability::metrics;
use crate::pipeline::GateState;

/// Rate-limit profile applied per endpoint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyClass {
    Login,
    General,
    Bulk,
    Sensitive,
}

impl PolicyClass {
    pub const ALL: [PolicyClass; 4] = [
        PolicyClass::Login,
        PolicyClass::General,
        PolicyClass::Bulk,
        PolicyClass::Sensitive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyClass::Login => "login",
            PolicyClass::General => "general",
            PolicyClass::Bulk => "bulk",
            PolicyClass::Sensitive => "sensitive",
        }
    }
}

/// Counter state for one (client, class) pair.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    pub window_start: Instant,
    pub count: u32,
    pub limit: u32,
    pub window: Duration,
    last_touched: Instant,
}

impl RateLimitBucket {
    fn new(now: Instant, policy: WindowPolicy) -> Self {
        Self {
            window_start: now,
            count: 0,
            limit: policy.limit,
            window: policy.window(),
            last_touched: now,
        }
    }
}

/// Result of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Deny {
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Shared bucket table.
pub struct RateLimiter {
    buckets: DashMap<(String, PolicyClass), RateLimitBucket>,
    config: ArcSwap<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Swap policies without dropping counters.
    pub fn reload(&self, config: RateLimitConfig) {
        self.config.store(Arc::new(config));
        tracing::info!("Rate limit policies reloaded");
    }

    pub fn health_path(&self) -> String {
        self.config.load().health_path.clone()
    }

    /// True for the health path, in test mode, or when limiting is disabled.
    pub fn is_exempt(&self, path: &str) -> bool {
        let config = self.config.load();
        !config.enabled || config.test_mode || path == config.health_path
    }

    pub fn check(&self, client_key: &str, class: PolicyClass) -> Decision {
        self.check_at(client_key, class, Instant::now())
    }

    /// Count one request at `now`.
    pub fn check_at(&self, client_key: &str, class: PolicyClass, now: Instant) -> Decision {
        let config = self.config.load();
        let policy = config.policy(class);

        if !config.enabled || config.test_mode {
            return Decision::Allow {
                limit: policy.limit,
                remaining: policy.limit,
                reset_after: policy.window(),
            };
        }

        let mut bucket = self
            .buckets
            .entry((client_key.to_string(), class))
            .or_insert_with(|| RateLimitBucket::new(now, policy));

        bucket.limit = policy.limit;
        bucket.window = policy.window();
        bucket.last_touched = now;

        let mut elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= bucket.window {
            bucket.window_start = now;
            bucket.count = 0;
            elapsed = Duration::ZERO;
        }

        bucket.count = bucket.count.saturating_add(1);
        let reset_after = bucket.window.saturating_sub(elapsed);

        if bucket.count > bucket.limit {
            Decision::Deny {
                retry_after: reset_after,
            }
        } else {
            Decision::Allow {
                limit: bucket.limit,
                remaining: bucket.limit - bucket.count,
                reset_after,
            }
        }
    }

    /// Drop buckets untouched for `max_idle`. Returns how many were removed.
    pub fn evict_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_touched) < max_idle);
        before.saturating_sub(self.buckets.len())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Periodic idle-bucket sweep until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let (interval, max_idle) = {
            let config = self.config.load();
            (
                Duration::from_secs(config.sweep_interval_secs.max(1)),
                Duration::from_secs(config.idle_eviction_secs),
            )
        };

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.evict_idle(Instant::now(), max_idle);
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = self.len(), "Evicted idle rate-limit buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// First gate: count the request against its route's policy class.
pub async fn rate_limit_middleware(
    State(state): State<GateState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let gov = &state.governance;
    let origin = match request.extensions().get::<RequestOrigin>() {
        Some(origin) => origin.clone(),
        None => {
            let origin = gov.client_keys.origin(&request);
            request.extensions_mut().insert(origin.clone());
            origin
        }
    };

    if gov.limiter.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let class = state.policy.class;
    match gov.limiter.check(&origin.client_key, class) {
        Decision::Allow {
            limit,
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            set_limit_headers(response.headers_mut(), limit, remaining, reset_after);
            response
        }
        Decision::Deny { retry_after } => {
            tracing::warn!(
                client = %origin.client_key,
                class = class.as_str(),
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(class.as_str());

            let actor = known_actor(&state, &request);
            if actor != AuditActor::Anonymous {
                let _ = gov.audit.security_event(
                    "rate_limit_exceeded",
                    &actor,
                    &origin,
                    &format!("{} rate limit exceeded", class.as_str()),
                );
            }

            GateError::RateLimitExceeded { retry_after }.into_response()
        }
    }
}

/// Attribution for a denial. This gate runs before authentication, so the
/// only evidence is an admin bearer token that verifies; neither the store
/// nor the limiter is touched.
fn known_actor(state: &GateState, request: &Request<Body>) -> AuditActor {
    match state.governance.tokens.verify_headers(request.headers()) {
        Ok(claims) if claims.role == ClaimedRole::Admin => {
            state.governance.identities.actor_for_subject(&claims.subject_id)
        }
        _ => AuditActor::Anonymous,
    }
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_after: Duration) {
    let values = [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
        ("x-ratelimit-reset", retry_after_secs(reset_after).to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn test_login_window_scenario() {
        let limiter = limiter();
        let start = Instant::now();

        for i in 0..5 {
            let at = start + Duration::from_secs(i * 10);
            assert!(
                limiter.check_at("203.0.113.5", PolicyClass::Login, at).is_allowed(),
                "request {} should pass",
                i + 1
            );
        }

        let sixth = limiter.check_at("203.0.113.5", PolicyClass::Login, start + Duration::from_secs(60));
        match sixth {
            Decision::Deny { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert_eq!(retry_after, Duration::from_secs(15 * 60 - 60));
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn test_every_class_allows_exactly_its_limit() {
        let limiter = limiter();
        let config = RateLimitConfig::default();
        let now = Instant::now();

        for class in PolicyClass::ALL {
            let limit = config.policy(class).limit;
            for n in 1..=limit {
                assert!(limiter.check_at("k", class, now).is_allowed(), "{class:?} #{n}");
            }
            assert!(!limiter.check_at("k", class, now).is_allowed(), "{class:?} over limit");
        }
    }

    #[test]
    fn test_window_reset() {
        let limiter = limiter();
        let start = Instant::now();
        for _ in 0..30 {
            limiter.check_at("k", PolicyClass::Sensitive, start);
        }
        assert!(!limiter.check_at("k", PolicyClass::Sensitive, start).is_allowed());

        let later = start + Duration::from_secs(60);
        match limiter.check_at("k", PolicyClass::Sensitive, later) {
            Decision::Allow { remaining, .. } => assert_eq!(remaining, 19),
            other => panic!("expected allow after reset, got {other:?}"),
        }
    }

    #[test]
    fn test_keys_and_classes_are_independent() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at("a", PolicyClass::Login, now);
        }
        assert!(!limiter.check_at("a", PolicyClass::Login, now).is_allowed());
        assert!(limiter.check_at("b", PolicyClass::Login, now).is_allowed());
        assert!(limiter.check_at("a", PolicyClass::General, now).is_allowed());
    }

    #[test]
    fn test_test_mode_and_health_path_bypass() {
        let bypass = RateLimiter::new(RateLimitConfig {
            test_mode: true,
            ..RateLimitConfig::default()
        });
        let now = Instant::now();
        for _ in 0..50 {
            assert!(bypass.check_at("k", PolicyClass::Login, now).is_allowed());
        }
        assert!(bypass.is_empty());

        let normal = limiter();
        assert!(normal.is_exempt("/health"));
        assert!(!normal.is_exempt("/admin/users"));
    }

    #[test]
    fn test_reload_applies_to_existing_buckets() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..3 {
            limiter.check_at("k", PolicyClass::Bulk, now);
        }
        limiter.reload(RateLimitConfig {
            bulk: WindowPolicy::new(300, 3),
            ..RateLimitConfig::default()
        });
        assert!(!limiter.check_at("k", PolicyClass::Bulk, now).is_allowed());
    }

    #[test]
    fn test_evict_idle() {
        let limiter = limiter();
        let start = Instant::now();
        limiter.check_at("old", PolicyClass::General, start);
        limiter.check_at("fresh", PolicyClass::General, start + Duration::from_secs(3000));

        let evicted = limiter.evict_idle(start + Duration::from_secs(3700), Duration::from_secs(3600));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            general: WindowPolicy::new(900, 10_000),
            ..RateLimitConfig::default()
        }));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        limiter.check_at("shared", PolicyClass::General, now);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        match limiter.check_at("shared", PolicyClass::General, now) {
            Decision::Allow { remaining, .. } => assert_eq!(remaining, 10_000 - 4001),
            other => panic!("expected allow, got {other:?}"),
        }
    }
}
