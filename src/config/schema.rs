//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::security::rate_limit::PolicyClass;

/// Root configuration for the admin gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Bearer token verification and bootstrap identity.
    pub auth: AuthConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Content screening configuration.
    pub screening: ScreeningConfig,

    /// Audit trail configuration.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin records seeded into the in-memory identity store.
    #[serde(default)]
    pub admins: Vec<SeedAdmin>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify bearer tokens. Required; may come
    /// from `COACHGATE_JWT_SECRET` instead.
    pub jwt_secret: String,

    /// Expected `iss` claim. Not checked when empty.
    pub issuer: String,

    /// Token subject that resolves to the bootstrap identity. Empty disables it.
    pub bootstrap_subject: String,

    /// Email reported for the bootstrap identity.
    pub bootstrap_email: String,

    /// Lifetime of tokens minted by the CLI, in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: String::new(),
            bootstrap_subject: String::new(),
            bootstrap_email: "admin@localhost".to_string(),
            token_ttl_secs: 8 * 60 * 60,
        }
    }
}

/// Window and ceiling for a single policy class.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests allowed per window.
    pub limit: u32,
}

impl WindowPolicy {
    pub const fn new(window_secs: u64, limit: u32) -> Self {
        Self { window_secs, limit }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Non-production test mode: every check is allowed and no counters move.
    pub test_mode: bool,

    /// Health-check path that always bypasses the limiter.
    pub health_path: String,

    /// Authentication attempts.
    pub login: WindowPolicy,

    /// Ordinary admin traffic.
    pub general: WindowPolicy,

    /// Bulk operations (exports, mass updates).
    pub bulk: WindowPolicy,

    /// Sensitive mutations (deletes, role changes).
    pub sensitive: WindowPolicy,

    /// Peers whose X-Forwarded-For / X-Real-IP headers are trusted.
    pub trusted_proxies: Vec<String>,

    /// Interval between idle-bucket sweeps, in seconds.
    pub sweep_interval_secs: u64,

    /// Buckets untouched for this long are evicted, in seconds.
    pub idle_eviction_secs: u64,
}

impl RateLimitConfig {
    pub fn policy(&self, class: PolicyClass) -> WindowPolicy {
        match class {
            PolicyClass::Login => self.login,
            PolicyClass::General => self.general,
            PolicyClass::Bulk => self.bulk,
            PolicyClass::Sensitive => self.sensitive,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test_mode: false,
            health_path: "/health".to_string(),
            login: WindowPolicy::new(15 * 60, 5),
            general: WindowPolicy::new(15 * 60, 100),
            bulk: WindowPolicy::new(5 * 60, 10),
            sensitive: WindowPolicy::new(60, 20),
            trusted_proxies: Vec::new(),
            sweep_interval_secs: 60,
            idle_eviction_secs: 60 * 60,
        }
    }
}

/// A named threat signature.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignatureConfig {
    /// Name reported in logs and audit entries.
    pub name: String,

    /// Regular expression tested against the URL and body.
    pub pattern: String,
}

impl SignatureConfig {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// Content screening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Enable content screening.
    pub enabled: bool,

    /// Ordered blocking signatures; the first match wins.
    pub patterns: Vec<SignatureConfig>,

    /// Signatures that are only logged, for tuning.
    pub monitor_patterns: Vec<SignatureConfig>,

    /// Maximum buffered body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: default_signatures(),
            monitor_patterns: vec![SignatureConfig::new(
                "sql_comment",
                r"(--|/\*|\*/)",
            )],
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

fn default_signatures() -> Vec<SignatureConfig> {
    vec![
        SignatureConfig::new("script_tag", r"(?i)<\s*/?\s*script\b"),
        SignatureConfig::new("script_uri", r"(?i)javascript\s*:"),
        SignatureConfig::new("event_handler", r"(?i)\bon(error|load|click|mouseover)\s*="),
        SignatureConfig::new("path_traversal", r"(\.\./|\.\.\\|%2e%2e%2f)"),
        SignatureConfig::new("command_chain", r"[;&|`]\s*(rm|cat|curl|wget|bash|sh|nc)\b"),
        SignatureConfig::new("command_substitution", r"\$\([^)]*\)"),
        SignatureConfig::new(
            "sql_statement",
            r"(?i);\s*(drop|delete|truncate|alter|insert|update)\s+(table|from|into|database)?",
        ),
        SignatureConfig::new("sql_union", r"(?i)\bunion\b\s+(all\s+)?select\b"),
        SignatureConfig::new("sql_tautology", r"(?i)'\s*or\s+'?\d+'?\s*=\s*'?\d+"),
    ]
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit recording.
    pub enabled: bool,

    /// Body keys (case-insensitive) stripped before a body is recorded.
    pub sensitive_fields: Vec<String>,

    /// Append-only JSON-lines file. In-memory only when unset.
    pub log_path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitive_fields: [
                "password",
                "currentPassword",
                "newPassword",
                "token",
                "accessToken",
                "refreshToken",
                "secret",
                "apiKey",
                "authorization",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            log_path: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin record loaded into the in-memory identity store at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedAdmin {
    pub id: String,
    pub email: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
