//! Admin request-governance gateway.
//!
//! Every privileged request passes a rate limiter, bearer-token
//! authentication, identity authorization and content screening before its
//! handler runs; its outcome is then recorded to the audit trail after the
//! response has been sent.

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod security;
pub mod store;

pub use config::GatewayConfig;
pub use error::{ErrorKind, GateError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{governed, public, GateState, Governance, RoutePolicy};
