//! Collaborator store interfaces.
//!
//! # Data Flow
//! ```text
//! identity resolver ──find_by_id / touch──▶ IdentityStore ──▶ document store
//! audit recorder    ──append───────────▶ AuditStore    ──▶ append log
//! ```
//!
//! # Design Decisions
//! - Only `find_by_id` failures are fatal to a request; `touch_last_seen` and `append`
//!   are always driven best-effort by callers
//! - Implementations here are the in-memory store and a JSON-lines audit log;
//!   the production document store lives behind the same traits

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEntry;
use crate::identity::{AdminId, AdminIdentity};

pub use jsonl::JsonlAuditStore;
pub use memory::{MemoryAuditStore, MemoryIdentityStore};

/// Error type for collaborator stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Admin account lookup and write-back.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: &AdminId) -> Result<Option<AdminIdentity>, StoreError>;

    /// Write `last_seen_at` only. Other fields may have changed since the
    /// record was read and must not be overwritten.
    async fn touch_last_seen(&self, id: &AdminId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;
}
