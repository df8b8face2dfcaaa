//! Admin identity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a document-store object id in hex digits.
const ADMIN_ID_LEN: usize = 24;

/// A well-formed admin record reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AdminId(String);

impl AdminId {
    /// Accepts exactly 24 hex digits. Case is folded to lowercase.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() == ADMIN_ID_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(raw.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AdminId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    Admin,
}

/// An admin account as held by the identity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminIdentity {
    pub id: String,
    pub email: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl AdminIdentity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role: AdminRole::Admin,
            is_active: true,
            last_seen_at: None,
        }
    }
}

/// Outcome of identity resolution.
///
/// The bootstrap identity is built in memory and never touches the store;
/// callers branch on the variant, never on the subject string.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedIdentity {
    Bootstrap(AdminIdentity),
    Persisted(AdminIdentity),
}

impl ResolvedIdentity {
    pub fn identity(&self) -> &AdminIdentity {
        match self {
            ResolvedIdentity::Bootstrap(identity) | ResolvedIdentity::Persisted(identity) => {
                identity
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.identity().id
    }

    pub fn email(&self) -> &str {
        &self.identity().email
    }

    pub fn is_bootstrap(&self) -> bool {
        matches!(self, ResolvedIdentity::Bootstrap(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_id_format() {
        assert!(AdminId::parse("64b7f0c2a1b2c3d4e5f60718").is_some());
        assert_eq!(
            AdminId::parse("64B7F0C2A1B2C3D4E5F60718").unwrap().as_str(),
            "64b7f0c2a1b2c3d4e5f60718"
        );
        assert!(AdminId::parse("64b7f0c2a1b2c3d4e5f6071").is_none());
        assert!(AdminId::parse("zzb7f0c2a1b2c3d4e5f60718").is_none());
        assert!(AdminId::parse("").is_none());
    }

    #[test]
    fn test_identity_serializes_camel_case() {
        let json = serde_json::to_value(AdminIdentity::new("a", "a@example.com")).unwrap();
        assert_eq!(json["isActive"], true);
        assert_eq!(json["role"], "admin");
        assert!(json["lastSeenAt"].is_null());
    }
}
