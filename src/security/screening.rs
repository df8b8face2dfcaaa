//! Request content screening.
//!
//! Coarse defense in depth: the URL and a serialized form of the body are
//! tested against an ordered signature list and the first hit blocks the
//! request. False positives are an accepted cost; this is not a substitute for
//! parameterized queries or output escaping. Monitor-only signatures never
//! block and exist to tune the list from logs.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use regex::Regex;
use serde_json::Value;

use crate::admin::auth::AdminContext;
use crate::audit::{AuditActor, CapturedBody, RequestOrigin};
use crate::config::{ScreeningConfig, SignatureConfig};
use crate::error::GateError;
use crate::observability::metrics;
use crate::pipeline::GateState;
use crate::security::client_key::UNKNOWN_CLIENT;

#[derive(Debug, Clone)]
struct Signature {
    name: String,
    regex: Regex,
}

impl Signature {
    fn compile(config: &SignatureConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            name: config.name.clone(),
            regex: Regex::new(&config.pattern)?,
        })
    }
}

#[derive(Debug)]
struct SignatureSet {
    enabled: bool,
    max_body_bytes: usize,
    block: Vec<Signature>,
    monitor: Vec<Signature>,
}

impl SignatureSet {
    fn compile(config: &ScreeningConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            enabled: config.enabled,
            max_body_bytes: config.max_body_bytes,
            block: config
                .patterns
                .iter()
                .map(Signature::compile)
                .collect::<Result<_, _>>()?,
            monitor: config
                .monitor_patterns
                .iter()
                .map(Signature::compile)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clear,
    Blocked { pattern: String },
}

/// Holds the active signature list; swapped wholesale on reload.
pub struct ContentScreener {
    signatures: ArcSwap<SignatureSet>,
}

impl ContentScreener {
    pub fn new(config: &ScreeningConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            signatures: ArcSwap::from_pointee(SignatureSet::compile(config)?),
        })
    }

    /// Replace the signature list. On a compile error the current list stays.
    pub fn reload(&self, config: &ScreeningConfig) -> Result<(), regex::Error> {
        let set = SignatureSet::compile(config)?;
        tracing::info!(
            patterns = set.block.len(),
            monitors = set.monitor.len(),
            "Screening signatures reloaded"
        );
        self.signatures.store(Arc::new(set));
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.signatures.load().enabled
    }

    pub fn max_body_bytes(&self) -> usize {
        self.signatures.load().max_body_bytes
    }

    /// Test `url` then `body` against each blocking signature in order.
    pub fn scan(&self, url: &str, body: &str) -> ScanVerdict {
        let set = self.signatures.load();

        for sig in &set.monitor {
            if sig.regex.is_match(url) || sig.regex.is_match(body) {
                tracing::info!(pattern = %sig.name, "Screening near miss");
            }
        }

        for sig in &set.block {
            if sig.regex.is_match(url) || sig.regex.is_match(body) {
                return ScanVerdict::Blocked {
                    pattern: sig.name.clone(),
                };
            }
        }
        ScanVerdict::Clear
    }
}

/// URL as seen on the wire plus its decoded query, so encoded payloads are
/// caught as well.
fn url_text(uri: &Uri) -> String {
    let mut text = uri.to_string();
    if let Some(query) = uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            text.push(' ');
            text.push_str(&key);
            text.push('=');
            text.push_str(&value);
        }
    }
    text
}

/// Serialized body: canonical JSON when it parses, lossy UTF-8 otherwise.
fn body_text(bytes: &[u8]) -> (String, Option<Value>) {
    if bytes.is_empty() {
        return (String::new(), None);
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => {
            let text = serde_json::to_string(&value)
                .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());
            (text, Some(value))
        }
        Err(_) => (String::from_utf8_lossy(bytes).into_owned(), None),
    }
}

/// Only the length limit is a 413; an aborted or broken upload is a 400.
fn body_error(e: axum::Error, limit: usize) -> GateError {
    let source = e.into_inner();
    if source.is::<LengthLimitError>() {
        tracing::warn!(limit, "Request body over limit");
        GateError::PayloadTooLarge { limit }
    } else {
        tracing::warn!(error = %source, "Request body could not be read");
        GateError::InvalidBody
    }
}

/// Fourth gate: scan the URL and buffered body, then hand the body on.
pub async fn screening_middleware(
    State(state): State<GateState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let screener = &state.governance.screener;
    if !screener.is_enabled() {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let limit = screener.max_body_bytes();
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => return body_error(e, limit).into_response(),
    };

    let url = url_text(&parts.uri);
    let (body, parsed) = body_text(&bytes);

    if let ScanVerdict::Blocked { pattern } = screener.scan(&url, &body) {
        let origin = parts
            .extensions
            .get::<RequestOrigin>()
            .cloned()
            .unwrap_or_else(|| RequestOrigin::new(UNKNOWN_CLIENT, None));
        tracing::warn!(
            client = %origin.client_key,
            pattern = %pattern,
            path = %parts.uri.path(),
            "Blocked request content"
        );
        metrics::record_content_blocked(&pattern);

        if let Some(ctx) = parts.extensions.get::<AdminContext>() {
            let _ = state.governance.audit.security_event(
                "security_threat_detected",
                &AuditActor::from(&ctx.identity),
                &origin,
                &format!("blocked by signature {pattern}"),
            );
        }
        return GateError::BlockedContent { pattern }.into_response();
    }

    if let Some(value) = parsed {
        parts.extensions.insert(CapturedBody(value));
    }
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
