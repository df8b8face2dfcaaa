use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::audit::RequestOrigin;
use crate::identity::{ResolvedIdentity, TokenClaims};
use crate::pipeline::GateState;

/// Attached to requests that cleared authentication and authorization.
#[derive(Clone, Debug)]
pub struct AdminContext {
    pub identity: ResolvedIdentity,
    pub claims: TokenClaims,
}

/// Second and third gates: verify the bearer token, then resolve the admin.
pub async fn admin_auth_middleware(
    State(state): State<GateState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let governance = &state.governance;

    let origin = match request.extensions().get::<RequestOrigin>() {
        Some(origin) => origin.clone(),
        None => governance.client_keys.origin(&request),
    };

    let claims = match governance.tokens.verify_headers(request.headers()) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(client = %origin.client_key, code = ?e.kind(), "Authentication failed");
            return e.into_response();
        }
    };

    let identity = match governance.identities.authorize(&claims, &origin).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    tracing::debug!(
        admin_id = %identity.id(),
        bootstrap = identity.is_bootstrap(),
        "Admin authorized"
    );
    request
        .extensions_mut()
        .insert(AdminContext { identity, claims });
    next.run(request).await
}
