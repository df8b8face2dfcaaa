//! Client identity extraction.
//!
//! # Design Decisions
//! - Forwarding headers are honored only when the direct peer is a trusted proxy
//! - Keys are normalized so one client maps to one bucket: IPv4-mapped IPv6
//!   collapses to dotted IPv4, IPv6 uses its canonical lowercase form

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Request},
};

use crate::audit::RequestOrigin;

/// Key used when no address can be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Clone, Default)]
pub struct ClientKeyExtractor {
    trusted_proxies: Vec<IpAddr>,
}

impl ClientKeyExtractor {
    /// Entries that do not parse as IP addresses are ignored.
    pub fn new<S: AsRef<str>>(trusted_proxies: &[S]) -> Self {
        Self {
            trusted_proxies: trusted_proxies
                .iter()
                .filter_map(|p| p.as_ref().parse().ok())
                .map(normalize)
                .collect(),
        }
    }

    /// Stable key for the client behind `peer`.
    pub fn client_key(&self, peer: Option<SocketAddr>, headers: &HeaderMap) -> String {
        let Some(peer) = peer.map(|p| normalize(p.ip())) else {
            return UNKNOWN_CLIENT.to_string();
        };

        if self.trusted_proxies.contains(&peer) {
            if let Some(forwarded) = forwarded_client(headers) {
                return forwarded.to_string();
            }
        }
        peer.to_string()
    }

    /// Capture the origin facts of `req`.
    pub fn origin(&self, req: &Request<Body>) -> RequestOrigin {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let headers = req.headers();

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        RequestOrigin::new(self.client_key(peer, headers), user_agent).with_request_id(request_id)
    }
}

/// Left-most X-Forwarded-For entry, falling back to X-Real-IP.
fn forwarded_client(headers: &HeaderMap) -> Option<IpAddr> {
    let from_xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| parse_ip(first.trim()));

    from_xff
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_ip(v.trim()))
        })
        .map(normalize)
}

/// Accepts bare addresses and `ip:port` / `[v6]:port` forms.
fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}
