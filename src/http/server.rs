//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: health probe plus the governed admin surface
//! - Wire up middleware (request ID, tracing, timeout, metrics)
//! - Serve with connect info so gates see the peer address
//! - Run background tasks: bucket sweeper and config reload

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::pipeline::Governance;
use crate::store::{AuditStore, IdentityStore};

/// HTTP server for the admin gateway.
pub struct HttpServer {
    router: Router,
    governance: Arc<Governance>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and stores.
    pub fn new(
        config: &GatewayConfig,
        identity_store: Arc<dyn IdentityStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Result<Self, regex::Error> {
        let governance = Arc::new(Governance::from_config(config, identity_store, audit_store)?);
        let router = build_router(config, Arc::clone(&governance), Router::new());
        Ok(Self { router, governance })
    }

    pub fn governance(&self) -> &Arc<Governance> {
        &self.governance
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        tokio::spawn(Arc::clone(&self.governance.limiter).run_sweeper(shutdown.subscribe()));

        if let Some(updates) = config_updates {
            tokio::spawn(apply_reloads(
                Arc::clone(&self.governance),
                updates,
                shutdown.subscribe(),
            ));
        }

        let mut stop = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
///
/// `business` carries application routes, already wrapped with
/// [`governed`](crate::pipeline::governed) where they need it.
#[allow(deprecated)]
pub fn build_router(config: &GatewayConfig, governance: Arc<Governance>, business: Router) -> Router {
    Router::new()
        .route(&config.rate_limit.health_path, get(health))
        .merge(setup_admin_router(governance))
        .merge(business)
        .layer(middleware::from_fn(track_metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.listener.request_timeout_secs,
        )))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16(), start);
    response
}

async fn apply_reloads(
    governance: Arc<Governance>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => governance.apply_reload(&config),
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    tracing::debug!("Config reload loop stopped");
}
