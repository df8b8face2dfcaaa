//! Fire-and-forget audit persistence.
//!
//! # Lifecycle of one entry
//! ```text
//! Pending ──response built──▶ Captured ──release──▶ persist attempt ─┬─▶ Persisted
//!                                                                    └─▶ Discarded
//! ```
//! `Discarded` is terminal and invisible to the client. Entries for the
//! bootstrap identity go straight to `Discarded`: it has no backing record to
//! reference.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::audit::entry::{AuditEntry, RequestOrigin};
use crate::audit::redact::Redactor;
use crate::config::AuditConfig;
use crate::identity::ResolvedIdentity;
use crate::observability::metrics;
use crate::resilience::best_effort::{self, Outcome};
use crate::store::AuditStore;

/// Who an entry is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditActor {
    /// No identity was established.
    Anonymous,
    /// The in-memory bootstrap identity.
    Bootstrap,
    /// A persisted admin record.
    Admin(String),
}

impl AuditActor {
    pub fn admin_id(&self) -> Option<String> {
        match self {
            AuditActor::Admin(id) => Some(id.clone()),
            AuditActor::Anonymous | AuditActor::Bootstrap => None,
        }
    }
}

impl From<&ResolvedIdentity> for AuditActor {
    fn from(identity: &ResolvedIdentity) -> Self {
        match identity {
            ResolvedIdentity::Bootstrap(_) => AuditActor::Bootstrap,
            ResolvedIdentity::Persisted(record) => AuditActor::Admin(record.id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditState {
    Pending,
    Captured,
    Persisted,
    Discarded,
}

/// Handle on a dispatched entry. Dropping it changes nothing.
#[must_use = "dropping the ticket is fine; bind it to `_` to make that explicit"]
pub struct AuditTicket {
    task: Option<JoinHandle<Outcome>>,
}

impl AuditTicket {
    fn discarded() -> Self {
        Self { task: None }
    }

    /// `Captured` until the persist attempt settles.
    pub fn state(&self) -> AuditState {
        match &self.task {
            Some(_) => AuditState::Captured,
            None => AuditState::Discarded,
        }
    }

    /// Wait for the persist attempt. Only tests have a reason to.
    pub async fn settled(self) -> AuditState {
        match self.task {
            None => AuditState::Discarded,
            Some(task) => match task.await {
                Ok(Outcome::Completed) => AuditState::Persisted,
                _ => AuditState::Discarded,
            },
        }
    }
}

/// Builds nothing and blocks nothing: takes finished entries and persists them
/// on detached tasks.
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    redactor: Redactor,
    enabled: bool,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, config: &AuditConfig) -> Self {
        Self {
            store,
            redactor: Redactor::new(&config.sensitive_fields),
            enabled: config.enabled,
        }
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Persist `entry` as soon as possible.
    pub fn record(&self, entry: AuditEntry, actor: &AuditActor) -> AuditTicket {
        self.dispatch(entry, actor, None)
    }

    /// Persist `entry` only after `release` fires or is dropped.
    pub fn record_after(
        &self,
        entry: AuditEntry,
        actor: &AuditActor,
        release: oneshot::Receiver<()>,
    ) -> AuditTicket {
        self.dispatch(entry, actor, Some(release))
    }

    /// Record a rejected or suspicious request.
    pub fn security_event(
        &self,
        action: &str,
        actor: &AuditActor,
        origin: &RequestOrigin,
        message: &str,
    ) -> AuditTicket {
        let entry = AuditEntry::new(action, "security", origin)
            .with_detail("requestId", origin.request_id.clone())
            .failed(message);
        self.record(entry, actor)
    }

    fn dispatch(
        &self,
        entry: AuditEntry,
        actor: &AuditActor,
        release: Option<oneshot::Receiver<()>>,
    ) -> AuditTicket {
        if !self.enabled {
            return AuditTicket::discarded();
        }

        if *actor == AuditActor::Bootstrap {
            tracing::info!(
                action = %entry.action,
                resource = %entry.resource,
                success = entry.success,
                "Bootstrap admin action, audit persistence skipped"
            );
            metrics::record_audit("skipped");
            return AuditTicket::discarded();
        }

        let entry = entry.with_admin(actor.admin_id());
        let store = Arc::clone(&self.store);

        let task = best_effort::spawn("audit_persist", async move {
            if let Some(release) = release {
                // Err means the response body was dropped, which also releases.
                let _ = release.await;
            }
            match store.append(&entry).await {
                Ok(()) => {
                    tracing::debug!(entry_id = %entry.id, action = %entry.action, "Audit entry persisted");
                    metrics::record_audit("persisted");
                    Ok(())
                }
                Err(e) => {
                    metrics::record_audit("discarded");
                    Err(e)
                }
            }
        });

        AuditTicket { task: Some(task) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryAuditStore, StoreError};
    use async_trait::async_trait;

    struct OfflineStore;

    #[async_trait]
    impl AuditStore for OfflineStore {
        async fn append(&self, _entry: &AuditEntry) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn origin() -> RequestOrigin {
        RequestOrigin::new("203.0.113.5", Some("tests".into()))
    }

    #[tokio::test]
    async fn test_persists_with_admin_attribution() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone(), &AuditConfig::default());

        let ticket = recorder.record(
            AuditEntry::new("view_user", "user", &origin()),
            &AuditActor::Admin("64b7f0c2a1b2c3d4e5f60718".into()),
        );
        assert_eq!(ticket.settled().await, AuditState::Persisted);

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].admin_id.as_deref(), Some("64b7f0c2a1b2c3d4e5f60718"));
    }

    #[tokio::test]
    async fn test_store_outage_is_discarded_quietly() {
        let recorder = AuditRecorder::new(Arc::new(OfflineStore), &AuditConfig::default());
        let ticket = recorder.security_event(
            "token_email_mismatch",
            &AuditActor::Anonymous,
            &origin(),
            "mismatch",
        );
        assert_eq!(ticket.settled().await, AuditState::Discarded);
    }

    #[tokio::test]
    async fn test_bootstrap_is_never_persisted() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone(), &AuditConfig::default());
        let ticket = recorder.record(
            AuditEntry::new("view_user", "user", &origin()),
            &AuditActor::Bootstrap,
        );
        assert_eq!(ticket.state(), AuditState::Discarded);
        assert_eq!(ticket.settled().await, AuditState::Discarded);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_waits_for_release() {
        let store = Arc::new(MemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone(), &AuditConfig::default());
        let (release_tx, release_rx) = oneshot::channel();

        let ticket = recorder.record_after(
            AuditEntry::new("update_plan", "diet_plan", &origin()),
            &AuditActor::Admin("64b7f0c2a1b2c3d4e5f60718".into()),
            release_rx,
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(ticket.state(), AuditState::Captured);
        assert!(store.is_empty());

        drop(release_tx);
        assert_eq!(ticket.settled().await, AuditState::Persisted);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_recorder_drops_everything() {
        let store = Arc::new(MemoryAuditStore::new());
        let config = AuditConfig {
            enabled: false,
            ..AuditConfig::default()
        };
        let recorder = AuditRecorder::new(store.clone(), &config);
        let ticket = recorder.record(
            AuditEntry::new("view_user", "user", &origin()),
            &AuditActor::Admin("64b7f0c2a1b2c3d4e5f60718".into()),
        );
        assert_eq!(ticket.settled().await, AuditState::Discarded);
        assert!(store.is_empty());
    }
}
