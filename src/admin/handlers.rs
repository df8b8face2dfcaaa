use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::admin::auth::AdminContext;
use crate::pipeline::Governance;

#[derive(Clone)]
pub struct AdminState {
    pub governance: Arc<Governance>,
    pub started_at: Instant,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub rate_limit_buckets: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Me {
    pub id: String,
    pub email: String,
    pub bootstrap: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub token_expires_at: DateTime<Utc>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        rate_limit_buckets: state.governance.limiter.len(),
    })
}

pub async fn get_me(Extension(ctx): Extension<AdminContext>) -> Json<Value> {
    let identity = ctx.identity.identity();
    Json(json!({
        "success": true,
        "data": Me {
            id: identity.id.clone(),
            email: identity.email.clone(),
            bootstrap: ctx.identity.is_bootstrap(),
            last_seen_at: identity.last_seen_at,
            token_expires_at: ctx.claims.expires_at,
        }
    }))
}

/// Credential checking lives with the account service; this route exists so
/// the login rate-limit class guards it.
pub async fn login() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "success": false,
            "error": "Credential login is handled by the account service",
        })),
    )
}
