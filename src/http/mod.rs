//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace span, timeout, metrics)
//!     → /health, or an admin route wrapped by the pipeline gates
//!     → Send to client
//! ```

pub mod server;

pub use server::{build_router, HttpServer};
