//! Pre-handler gates that do not depend on identity.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_key.rs (normalized client key + request origin)
//!     → rate_limit.rs (per-key, per-class fixed window)
//!     → [authentication / authorization, see identity]
//!     → screening.rs (URL and body signature scan)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: every gate failure is terminal for the request
//! - No trust in client input: forwarding headers only from trusted proxies

pub mod client_key;
pub mod rate_limit;
pub mod screening;

pub use client_key::ClientKeyExtractor;
pub use rate_limit::{Decision, PolicyClass, RateLimiter};
pub use screening::{ContentScreener, ScanVerdict};
