//! In-memory stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::audit::AuditEntry;
use crate::config::SeedAdmin;
use crate::identity::{AdminId, AdminIdentity};
use crate::store::{AuditStore, IdentityStore, StoreError};

/// A thread-safe identity store keyed by admin id.
#[derive(Default)]
pub struct MemoryIdentityStore {
    records: DashMap<String, AdminIdentity>,
    lookups: AtomicUsize,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from configured seed records. Malformed ids are skipped.
    pub fn from_seed(seed: &[SeedAdmin]) -> Self {
        let store = Self::new();
        for admin in seed {
            match AdminId::parse(&admin.id) {
                Some(id) => {
                    let mut record = AdminIdentity::new(id.as_str(), admin.email.clone());
                    record.is_active = admin.active;
                    store.insert(record);
                }
                None => tracing::warn!(id = %admin.id, "Skipping seed admin with malformed id"),
            }
        }
        tracing::info!("Loaded {} admin records", store.records.len());
        store
    }

    pub fn insert(&self, record: AdminIdentity) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<AdminIdentity> {
        self.records.get(id).map(|r| r.value().clone())
    }

    /// Change an admin's email out-of-band.
    pub fn set_email(&self, id: &str, email: &str) -> bool {
        self.records
            .get_mut(id)
            .map(|mut r| r.email = email.to_string())
            .is_some()
    }

    pub fn set_active(&self, id: &str, active: bool) -> bool {
        self.records
            .get_mut(id)
            .map(|mut r| r.is_active = active)
            .is_some()
    }

    /// Number of `find_by_id` calls served.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_id(&self, id: &AdminId) -> Result<Option<AdminIdentity>, StoreError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.get(id.as_str()))
    }

    async fn touch_last_seen(&self, id: &AdminId, at: DateTime<Utc>) -> Result<(), StoreError> {
        // A record deleted since lookup stays deleted.
        if let Some(mut record) = self.records.get_mut(id.as_str()) {
            record.last_seen_at = Some(at);
        }
        Ok(())
    }
}

/// An append-only audit log held in memory.
#[derive(Default)]
pub struct MemoryAuditStore {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("audit log mutex poisoned".into()))?;
        entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_skips_malformed_ids() {
        let store = MemoryIdentityStore::from_seed(&[
            SeedAdmin {
                id: "64b7f0c2a1b2c3d4e5f60718".into(),
                email: "coach@example.com".into(),
                active: true,
            },
            SeedAdmin {
                id: "not-an-id".into(),
                email: "x@example.com".into(),
                active: true,
            },
        ]);
        assert_eq!(store.len(), 1);

        let id = AdminId::parse("64b7f0c2a1b2c3d4e5f60718").unwrap();
        let found = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.email, "coach@example.com");
        assert_eq!(store.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_out_of_band_mutations() {
        let store = MemoryIdentityStore::new();
        store.insert(AdminIdentity::new("64b7f0c2a1b2c3d4e5f60718", "a@example.com"));
        assert!(store.set_email("64b7f0c2a1b2c3d4e5f60718", "b@example.com"));
        assert!(store.set_active("64b7f0c2a1b2c3d4e5f60718", false));
        assert!(!store.set_active("missing", false));

        let record = store.get("64b7f0c2a1b2c3d4e5f60718").unwrap();
        assert_eq!(record.email, "b@example.com");
        assert!(!record.is_active);
    }

    #[tokio::test]
    async fn test_touch_only_writes_last_seen() {
        let store = MemoryIdentityStore::new();
        store.insert(AdminIdentity::new("64b7f0c2a1b2c3d4e5f60718", "a@example.com"));
        store.set_active("64b7f0c2a1b2c3d4e5f60718", false);
        store.set_email("64b7f0c2a1b2c3d4e5f60718", "b@example.com");

        let id = AdminId::parse("64b7f0c2a1b2c3d4e5f60718").unwrap();
        let at = Utc::now();
        store.touch_last_seen(&id, at).await.unwrap();

        let record = store.get("64b7f0c2a1b2c3d4e5f60718").unwrap();
        assert_eq!(record.last_seen_at, Some(at));
        assert_eq!(record.email, "b@example.com");
        assert!(!record.is_active);

        let missing = AdminId::parse("aaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        store.touch_last_seen(&missing, at).await.unwrap();
        assert!(store.get("aaaaaaaaaaaaaaaaaaaaaaaa").is_none());
    }
}
