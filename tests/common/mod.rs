//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use axum::{
    body::Body,
    extract::{ConnectInfo, Path},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use coachgate::audit::{AuditEntry, AuditExtras};
use coachgate::config::GatewayConfig;
use coachgate::http::build_router;
use coachgate::identity::{AdminId, AdminIdentity, TokenAuthenticator, TokenGrant};
use coachgate::pipeline::{governed, Governance, RoutePolicy};
use coachgate::security::PolicyClass;
use coachgate::store::{
    AuditStore, IdentityStore, MemoryAuditStore, MemoryIdentityStore, StoreError,
};

pub const SECRET: &str = "integration-test-secret-0123456789";
pub const ADMIN_ID: &str = "64b7f0c2a1b2c3d4e5f60718";
pub const ADMIN_EMAIL: &str = "coach@example.com";
pub const PEER: &str = "203.0.113.5:40000";
pub const BOOTSTRAP_SUBJECT: &str = "bootstrap-admin";

/// Identity store whose lookups can be made to fail.
#[derive(Default)]
pub struct FlakyIdentityStore {
    pub inner: MemoryIdentityStore,
    pub fail_lookups: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl IdentityStore for FlakyIdentityStore {
    async fn find_by_id(&self, id: &AdminId) -> Result<Option<AdminIdentity>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.find_by_id(id).await
    }

    async fn touch_last_seen(&self, id: &AdminId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.touch_last_seen(id, at).await
    }
}

/// Audit store that can be taken offline.
#[derive(Default)]
pub struct FlakyAuditStore {
    pub inner: MemoryAuditStore,
    pub offline: AtomicBool,
}

#[async_trait]
impl AuditStore for FlakyAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("audit store offline".into()));
        }
        self.inner.append(entry).await
    }
}

pub fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.auth.bootstrap_subject = BOOTSTRAP_SUBJECT.to_string();
    config
}

pub struct Harness {
    pub router: Router,
    pub config: GatewayConfig,
    pub governance: Arc<Governance>,
    pub identities: Arc<FlakyIdentityStore>,
    pub audit: Arc<FlakyAuditStore>,
    /// Business handler invocations.
    pub handled: Arc<AtomicUsize>,
}

const VIEW_USER: RoutePolicy = RoutePolicy::new(PolicyClass::General, "view_user", "user");
const DELETE_USER: RoutePolicy = RoutePolicy::new(PolicyClass::Sensitive, "delete_user", "user");
const UPDATE_PLAN: RoutePolicy = RoutePolicy::new(PolicyClass::General, "update_plan", "diet_plan");
const CREATE_NOTE: RoutePolicy = RoutePolicy::new(PolicyClass::Bulk, "create_note", "note");

pub fn harness(config: GatewayConfig) -> Harness {
    let identities = Arc::new(FlakyIdentityStore::default());
    identities
        .inner
        .insert(AdminIdentity::new(ADMIN_ID, ADMIN_EMAIL));
    let audit = Arc::new(FlakyAuditStore::default());

    let governance = Arc::new(
        Governance::from_config(&config, identities.clone(), audit.clone()).unwrap(),
    );
    let handled = Arc::new(AtomicUsize::new(0));

    let business = business_routes(&governance, handled.clone());
    let router = build_router(&config, Arc::clone(&governance), business)
        .layer(middleware::from_fn(connect_info_from_header));

    Harness {
        router,
        config,
        governance,
        identities,
        audit,
        handled,
    }
}

/// Stand-ins for the business surface the pipeline wraps.
fn business_routes(governance: &Arc<Governance>, handled: Arc<AtomicUsize>) -> Router {
    let h1 = handled.clone();
    let h2 = handled.clone();
    let h3 = handled.clone();
    let h4 = handled;

    Router::new()
        .route(
            "/admin/users/{userId}",
            governed(
                routing::get(move |Path(user_id): Path<String>| async move {
                    h1.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "success": true, "data": { "_id": user_id, "name": "Sam" } }))
                }),
                governance,
                VIEW_USER,
            )
            .merge(governed(
                routing::delete(move || async move {
                    h2.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::CONFLICT,
                        Json(json!({ "success": false, "error": "user has an active plan" })),
                    )
                }),
                governance,
                DELETE_USER,
            )),
        )
        .route(
            "/admin/plans/{id}",
            governed(
                routing::put(move |Json(body): Json<Value>| async move {
                    h3.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "success": true, "data": body }))
                }),
                governance,
                UPDATE_PLAN,
            ),
        )
        .route(
            "/admin/notes",
            governed(
                routing::post(move |Json(_body): Json<Value>| async move {
                    h4.fetch_add(1, Ordering::SeqCst);
                    let mut response = (
                        StatusCode::CREATED,
                        Json(json!({ "success": true, "data": { "_id": "note-1" } })),
                    )
                        .into_response();
                    response
                        .extensions_mut()
                        .insert(AuditExtras::new().with("channel", "chat"));
                    response
                }),
                governance,
                CREATE_NOTE,
            ),
        )
}

/// `oneshot` has no socket; take the peer from `x-test-peer` or use [`PEER`].
async fn connect_info_from_header(mut request: Request<Body>, next: Next) -> Response {
    let peer: SocketAddr = request
        .headers()
        .get("x-test-peer")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| PEER.parse().unwrap());
    request.extensions_mut().insert(ConnectInfo(peer));
    next.run(request).await
}

pub fn token(subject: &str, email: &str) -> String {
    TokenAuthenticator::new(&config().auth)
        .issue(&TokenGrant::admin(subject, email, Duration::from_secs(600)))
        .unwrap()
}

pub fn token_with_role(subject: &str, email: &str, role: &str) -> String {
    TokenAuthenticator::new(&config().auth)
        .issue(&TokenGrant::admin(subject, email, Duration::from_secs(600)).with_role(role))
        .unwrap()
}

pub fn admin_token() -> String {
    token(ADMIN_ID, ADMIN_EMAIL)
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, None)
}

pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl Harness {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send and read the JSON body, which also releases any pending audit.
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    pub fn handled(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.audit.inner.entries()
    }

    /// Wait until `n` audit entries are persisted.
    pub async fn audited(&self, n: usize) -> Vec<AuditEntry> {
        let audit = self.audit.clone();
        assert!(
            eventually(move || audit.inner.len() >= n, Duration::from_secs(2)).await,
            "expected {n} audit entries, found {}",
            self.audit.inner.len()
        );
        self.entries()
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F>(check: F, timeout: Duration) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let spawned fire-and-forget tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
