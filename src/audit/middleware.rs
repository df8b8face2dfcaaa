//! Post-response audit hook for governed routes.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    extract::{rejection::RawPathParamsRejection, MatchedPath, RawPathParams, State},
    http::{header, Request, Response, StatusCode},
    middleware::Next,
};
use http_body::{Frame, SizeHint};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::admin::auth::AdminContext;
use crate::audit::entry::{AuditEntry, AuditExtras, CapturedBody, RequestOrigin};
use crate::audit::recorder::{AuditActor, AuditState};
use crate::pipeline::GateState;

/// Response bodies larger than this are not inspected for ids or errors.
const MAX_INSPECTED_BODY: u64 = 64 * 1024;

/// Response-body fields that may carry the id of the touched resource.
const RESOURCE_ID_FIELDS: [&[&str]; 4] = [&["id"], &["_id"], &["data", "id"], &["data", "_id"]];

pub async fn audit_middleware(
    State(state): State<GateState>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let start = Instant::now();

    let Some(ctx) = request.extensions().get::<AdminContext>().cloned() else {
        return next.run(request).await;
    };

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().clone();
    let origin = request
        .extensions()
        .get::<RequestOrigin>()
        .cloned()
        .unwrap_or_else(|| state.governance.client_keys.origin(&request));
    let request_body = request.extensions().get::<CapturedBody>().map(|b| b.0.clone());
    let path_id = params.ok().and_then(|p| path_resource_id(&p));

    let response = next.run(request).await;

    let status = response.status();
    let success = status.is_success() || status.is_redirection();
    let (mut parts, body) = response.into_parts();
    let extras = parts.extensions.remove::<AuditExtras>();

    let inspectable = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
        && body
            .size_hint()
            .exact()
            .is_some_and(|len| len <= MAX_INSPECTED_BODY);
    let (body, response_json) = if inspectable {
        inspect(body).await
    } else {
        (body, None)
    };

    let resource_id = path_id.or_else(|| response_json.as_ref().and_then(body_resource_id));

    let policy = &state.policy;
    let mut entry = AuditEntry::new(policy.action, policy.resource, &origin)
        .with_resource_id(resource_id)
        .with_detail("route", route)
        .with_detail("method", method.as_str())
        .with_detail("elapsedMs", start.elapsed().as_millis() as u64)
        .with_detail("statusCode", status.as_u16())
        .with_detail("requestId", origin.request_id.clone());

    if let Some(body) = request_body {
        entry = entry.with_detail("body", state.governance.audit.redactor().sanitize(&body));
    }
    if let Some(AuditExtras(extra)) = extras {
        entry = entry.with_details(extra);
    }
    if !success {
        entry = entry.failed(error_message(response_json.as_ref(), status));
    }

    let (release, released) = oneshot::channel::<()>();
    let ticket = state
        .governance
        .audit
        .record_after(entry, &AuditActor::from(&ctx.identity), released);

    if ticket.state() == AuditState::Discarded {
        return Response::from_parts(parts, body);
    }

    Response::from_parts(parts, Body::new(ReleaseOnDrop { inner: body, _release: release }))
}

/// Response body that signals the audit task when dropped, which the server
/// does once the body is fully written or the connection goes away. Frames
/// and size hints pass through untouched.
struct ReleaseOnDrop {
    inner: Body,
    _release: oneshot::Sender<()>,
}

impl HttpBody for ReleaseOnDrop {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

async fn inspect(body: Body) -> (Body, Option<Value>) {
    match to_bytes(body, MAX_INSPECTED_BODY as usize).await {
        Ok(bytes) => {
            let json = serde_json::from_slice(&bytes).ok();
            (Body::from(bytes), json)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to buffer response body for audit");
            (Body::empty(), None)
        }
    }
}

/// A param named `id` (or ending in `Id`/`_id`), else the first param.
fn path_resource_id(params: &RawPathParams) -> Option<String> {
    let params: Vec<(&str, &str)> = params.iter().collect();
    params
        .iter()
        .find(|(name, _)| *name == "id" || name.ends_with("Id") || name.ends_with("_id"))
        .or_else(|| params.first())
        .map(|(_, value)| value.to_string())
}

fn body_resource_id(json: &Value) -> Option<String> {
    RESOURCE_ID_FIELDS.iter().find_map(|path| {
        let value = path.iter().try_fold(json, |v, key| v.get(*key))?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}

fn error_message(json: Option<&Value>, status: StatusCode) -> String {
    json.and_then(|j| j.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}
