//! Composition of the governance gates around business routes.
//!
//! # Data Flow
//! ```text
//! request ─▶ rate_limit ─▶ admin_auth ─▶ screening ─▶ audit ─▶ handler
//!                                                        │
//! response ◀──────────────────────────────────────────────┘ (entry persisted after send)
//! ```
//!
//! Each gate may short-circuit with a [`GateError`](crate::error::GateError);
//! nothing after the failing gate runs.

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::MethodRouter};

use crate::admin::auth::admin_auth_middleware;
use crate::audit::{audit_middleware, AuditRecorder};
use crate::config::GatewayConfig;
use crate::identity::{IdentityResolver, TokenAuthenticator};
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::screening::screening_middleware;
use crate::security::{ClientKeyExtractor, ContentScreener, PolicyClass, RateLimiter};
use crate::store::{AuditStore, IdentityStore};

/// Shared gate components, one instance per process.
pub struct Governance {
    pub limiter: Arc<RateLimiter>,
    pub client_keys: ClientKeyExtractor,
    pub tokens: TokenAuthenticator,
    pub identities: IdentityResolver,
    pub screener: ContentScreener,
    pub audit: Arc<AuditRecorder>,
}

impl Governance {
    pub fn from_config(
        config: &GatewayConfig,
        identity_store: Arc<dyn IdentityStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Result<Self, regex::Error> {
        let audit = Arc::new(AuditRecorder::new(audit_store, &config.audit));
        Ok(Self {
            limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            client_keys: ClientKeyExtractor::new(&config.rate_limit.trusted_proxies),
            tokens: TokenAuthenticator::new(&config.auth),
            identities: IdentityResolver::new(identity_store, Arc::clone(&audit), &config.auth),
            screener: ContentScreener::new(&config.screening)?,
            audit,
        })
    }

    /// Swap in reloadable settings: rate-limit policies and screening
    /// signatures. Existing buckets are kept. The health path is routed once
    /// at startup and does not change.
    pub fn apply_reload(&self, config: &GatewayConfig) {
        let mut rate_limit = config.rate_limit.clone();
        let health_path = self.limiter.health_path();
        if rate_limit.health_path != health_path {
            tracing::warn!(
                current = %health_path,
                requested = %rate_limit.health_path,
                "rate_limit.health_path cannot change at runtime, keeping current"
            );
            rate_limit.health_path = health_path;
        }
        self.limiter.reload(rate_limit);
        if let Err(e) = self.screener.reload(&config.screening) {
            tracing::error!(error = %e, "Screening reload rejected, keeping current signatures");
        }
    }
}

/// Per-route governance: limiter class and audit target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    pub class: PolicyClass,
    pub action: &'static str,
    pub resource: &'static str,
}

impl RoutePolicy {
    pub const fn new(class: PolicyClass, action: &'static str, resource: &'static str) -> Self {
        Self {
            class,
            action,
            resource,
        }
    }
}

/// State handed to every gate middleware of one route.
#[derive(Clone)]
pub struct GateState {
    pub governance: Arc<Governance>,
    pub policy: RoutePolicy,
}

/// Wrap `route` in the full gate sequence.
pub fn governed<S>(route: MethodRouter<S>, governance: &Arc<Governance>, policy: RoutePolicy) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    let state = GateState {
        governance: Arc::clone(governance),
        policy,
    };
    // Last layer added runs first.
    route
        .layer(from_fn_with_state(state.clone(), audit_middleware))
        .layer(from_fn_with_state(state.clone(), screening_middleware))
        .layer(from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(from_fn_with_state(state, rate_limit_middleware))
}

/// Rate limiting only, for routes reachable without a token.
pub fn public<S>(route: MethodRouter<S>, governance: &Arc<Governance>, class: PolicyClass) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    let state = GateState {
        governance: Arc::clone(governance),
        policy: RoutePolicy::new(class, "public_access", "public"),
    };
    route.layer(from_fn_with_state(state, rate_limit_middleware))
}
