//! Audit entry and the request facts it is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Where a request came from. Captured once by the first gate and carried in
/// request extensions for every later stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub client_key: String,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl RequestOrigin {
    pub fn new(client_key: impl Into<String>, user_agent: Option<String>) -> Self {
        Self {
            client_key: client_key.into(),
            user_agent,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

/// One immutable record of an administrative action or a security event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub admin_id: Option<String>,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: Map<String, Value>,
    pub client_address: String,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// A successful entry with no actor and empty details.
    pub fn new(action: impl Into<String>, resource: impl Into<String>, origin: &RequestOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            admin_id: None,
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            details: Map::new(),
            client_address: origin.client_key.clone(),
            user_agent: origin.user_agent.clone(),
            timestamp: Utc::now(),
            success: true,
            error_message: None,
        }
    }

    #[must_use]
    pub fn with_admin(mut self, admin_id: Option<String>) -> Self {
        self.admin_id = admin_id;
        self
    }

    #[must_use]
    pub fn with_resource_id(mut self, resource_id: Option<String>) -> Self {
        self.resource_id = resource_id;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details.extend(details);
        self
    }

    #[must_use]
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }
}

/// Parsed JSON request body, left in request extensions by the screener.
#[derive(Debug, Clone)]
pub struct CapturedBody(pub Value);

/// Extra audit details a handler attaches to its response.
///
/// ```ignore
/// let mut response = Json(plan).into_response();
/// response.extensions_mut().insert(AuditExtras::new().with("week", 3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AuditExtras(pub Map<String, Value>);

impl AuditExtras {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }
}
