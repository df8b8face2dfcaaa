pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};

use self::handlers::{get_me, get_status, login, AdminState};
use crate::pipeline::{governed, public, Governance, RoutePolicy};
use crate::security::PolicyClass;

pub const STATUS_POLICY: RoutePolicy = RoutePolicy::new(PolicyClass::General, "view_status", "system");
pub const ME_POLICY: RoutePolicy = RoutePolicy::new(PolicyClass::General, "view_profile", "admin");

pub fn setup_admin_router(governance: Arc<Governance>) -> Router {
    let state = AdminState {
        governance: Arc::clone(&governance),
        started_at: Instant::now(),
    };
    Router::new()
        .route("/admin/login", public(post(login), &governance, PolicyClass::Login))
        .route("/admin/status", governed(get(get_status), &governance, STATUS_POLICY))
        .route("/admin/me", governed(get(get_me), &governance, ME_POLICY))
        .with_state(state)
}
