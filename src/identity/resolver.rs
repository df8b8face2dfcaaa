//! Identity resolution and admin authorization.
//!
//! # Gate order
//! 1. claimed role must be `admin`
//! 2. the configured bootstrap subject resolves in memory, no store call
//! 3. subject must be a well-formed admin id
//! 4. record must exist (a store failure is a 503, never a 401)
//! 5. record must be active
//! 6. token email must equal the record's current email
//!
//! Only after every gate passes is `last_seen_at` touched, and that write is
//! best-effort: its failure never reaches the request.

use std::sync::Arc;

use chrono::Utc;

use crate::audit::{AuditActor, AuditRecorder, RequestOrigin};
use crate::config::AuthConfig;
use crate::error::GateError;
use crate::identity::model::{AdminId, AdminIdentity, ResolvedIdentity};
use crate::identity::token::{ClaimedRole, TokenClaims};
use crate::resilience::best_effort;
use crate::store::IdentityStore;

pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    audit: Arc<AuditRecorder>,
    bootstrap_subject: String,
    bootstrap_email: String,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn IdentityStore>, audit: Arc<AuditRecorder>, config: &AuthConfig) -> Self {
        Self {
            store,
            audit,
            bootstrap_subject: config.bootstrap_subject.clone(),
            bootstrap_email: config.bootstrap_email.clone(),
        }
    }

    fn is_bootstrap(&self, subject: &str) -> bool {
        !self.bootstrap_subject.is_empty() && subject == self.bootstrap_subject
    }

    /// Audit attribution for a subject taken from an already verified token.
    /// Touches no store.
    pub fn actor_for_subject(&self, subject: &str) -> AuditActor {
        if self.is_bootstrap(subject) {
            AuditActor::Bootstrap
        } else {
            match AdminId::parse(subject) {
                Some(id) => AuditActor::Admin(id.to_string()),
                None => AuditActor::Anonymous,
            }
        }
    }

    /// Run the authorization gates for verified `claims`.
    pub async fn authorize(
        &self,
        claims: &TokenClaims,
        origin: &RequestOrigin,
    ) -> Result<ResolvedIdentity, GateError> {
        if let ClaimedRole::Other(role) = &claims.role {
            tracing::warn!(
                subject = %claims.subject_id,
                role = %role,
                client = %origin.client_key,
                "Non-admin token on admin route"
            );
            let _ = self.audit.security_event(
                "unauthorized_admin_access",
                &AuditActor::Anonymous,
                origin,
                &format!("subject {} presented role {}", claims.subject_id, role),
            );
            return Err(GateError::InsufficientPermissions);
        }

        if self.is_bootstrap(&claims.subject_id) {
            tracing::debug!(subject = %claims.subject_id, "Bootstrap admin resolved");
            let email = if self.bootstrap_email.is_empty() {
                claims.email.clone()
            } else {
                self.bootstrap_email.clone()
            };
            let mut identity = AdminIdentity::new(claims.subject_id.clone(), email);
            identity.last_seen_at = Some(Utc::now());
            return Ok(ResolvedIdentity::Bootstrap(identity));
        }

        let id = AdminId::parse(&claims.subject_id).ok_or(GateError::InvalidAdminId)?;

        let mut record = match self.store.find_by_id(&id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(admin_id = %id, "Admin record not found");
                return Err(GateError::AdminNotFound);
            }
            Err(e) => {
                tracing::error!(admin_id = %id, error = %e, "Identity lookup failed");
                return Err(GateError::IdentityLookupFailed);
            }
        };

        let actor = AuditActor::Admin(id.to_string());

        if !record.is_active {
            tracing::warn!(admin_id = %id, client = %origin.client_key, "Deactivated admin rejected");
            let _ = self.audit.security_event(
                "deactivated_admin_access",
                &actor,
                origin,
                "account is deactivated",
            );
            return Err(GateError::AccountDeactivated);
        }

        if record.email != claims.email {
            tracing::warn!(admin_id = %id, client = %origin.client_key, "Token email does not match record");
            let _ = self.audit.security_event(
                "token_email_mismatch",
                &actor,
                origin,
                "token email does not match the current account email",
            );
            return Err(GateError::TokenEmailMismatch);
        }

        let now = Utc::now();
        record.last_seen_at = Some(now);
        let store = Arc::clone(&self.store);
        let _ = best_effort::spawn("last_seen_touch", async move {
            store.touch_last_seen(&id, now).await
        });

        Ok(ResolvedIdentity::Persisted(record))
    }
}
