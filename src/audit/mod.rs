//! Audit trail.
//!
//! # Data Flow
//! ```text
//! handler response ──▶ audit_middleware ──builds──▶ AuditEntry
//!        │                                              │
//!        ▼                                              ▼
//!  body wrapped in drop guard ──released──▶ AuditRecorder task ──append──▶ AuditStore
//! ```
//!
//! # Design Decisions
//! - The entry is built before the response leaves, persisted only after the
//!   body is dropped by the server
//! - Persistence is at-most-once; failures are logged and counted, never retried
//! - Gate rejections record themselves as security events through the same recorder

pub mod entry;
pub mod middleware;
pub mod recorder;
pub mod redact;

pub use entry::{AuditEntry, AuditExtras, CapturedBody, RequestOrigin};
pub use middleware::audit_middleware;
pub use recorder::{AuditActor, AuditRecorder, AuditState, AuditTicket};
pub use redact::{Redactor, REDACTED};
