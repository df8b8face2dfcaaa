//! Configuration validation.
//!
//! Semantic checks only; serde already handled the syntax. Every problem is
//! collected so an operator sees the full list in one pass.

use std::net::SocketAddr;

use regex::Regex;

use crate::config::schema::{GatewayConfig, SignatureConfig};
use crate::identity::AdminId;
use crate::security::rate_limit::PolicyClass;

/// Shortest accepted HMAC signing secret.
pub const MIN_SECRET_LEN: usize = 16;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("auth.jwt_secret (or COACHGATE_JWT_SECRET) must be set")]
    EmptySecret,

    #[error("auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("auth.bootstrap_subject '{0}' collides with the admin id format")]
    BootstrapSubject(String),

    #[error("rate_limit.{0}: window_secs and limit must be greater than zero")]
    ZeroPolicy(&'static str),

    #[error("rate_limit.health_path '{0}' must start with '/'")]
    HealthPath(String),

    #[error("rate_limit.trusted_proxies: '{0}' is not an IP address")]
    TrustedProxy(String),

    #[error("screening pattern '{name}' does not compile: {reason}")]
    Pattern { name: String, reason: String },

    #[error("admins[{0}]: id and email are required")]
    SeedAdmin(usize),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    } else if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakSecret);
    }
    if AdminId::parse(&config.auth.bootstrap_subject).is_some() {
        errors.push(ValidationError::BootstrapSubject(
            config.auth.bootstrap_subject.clone(),
        ));
    }

    for class in PolicyClass::ALL {
        let policy = config.rate_limit.policy(class);
        if policy.window_secs == 0 || policy.limit == 0 {
            errors.push(ValidationError::ZeroPolicy(class.as_str()));
        }
    }

    if !config.rate_limit.health_path.starts_with('/') {
        errors.push(ValidationError::HealthPath(
            config.rate_limit.health_path.clone(),
        ));
    }

    for proxy in &config.rate_limit.trusted_proxies {
        if proxy.parse::<std::net::IpAddr>().is_err() {
            errors.push(ValidationError::TrustedProxy(proxy.clone()));
        }
    }

    check_patterns(&config.screening.patterns, &mut errors);
    check_patterns(&config.screening.monitor_patterns, &mut errors);

    for (i, admin) in config.admins.iter().enumerate() {
        if admin.id.is_empty() || admin.email.is_empty() {
            errors.push(ValidationError::SeedAdmin(i));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_patterns(patterns: &[SignatureConfig], errors: &mut Vec<ValidationError>) {
    for sig in patterns {
        if let Err(e) = Regex::new(&sig.pattern) {
            errors.push(ValidationError::Pattern {
                name: sig.name.clone(),
                reason: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "a-signing-secret-of-decent-length".into();
        config
    }

    #[test]
    fn test_defaults_need_only_a_secret() {
        assert_eq!(
            validate_config(&GatewayConfig::default()),
            Err(vec![ValidationError::EmptySecret])
        );
        let config = with_secret();
        assert_eq!(validate_config(&config), Ok(()));
        assert!(config.auth.bootstrap_subject.is_empty());
    }

    #[test]
    fn test_short_secret_and_id_shaped_bootstrap_subject() {
        let mut config = with_secret();
        config.auth.jwt_secret = "short".into();
        config.auth.bootstrap_subject = "64b7f0c2a1b2c3d4e5f60718".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::WeakSecret,
                ValidationError::BootstrapSubject("64b7f0c2a1b2c3d4e5f60718".into()),
            ]
        );
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = with_secret();
        config.listener.bind_address = "not-an-address".into();
        config.auth.jwt_secret.clear();
        config.rate_limit.bulk.limit = 0;
        config.screening.patterns.push(SignatureConfig::new("broken", "(unclosed"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::EmptySecret));
        assert!(errors.contains(&ValidationError::ZeroPolicy("bulk")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Pattern { name, .. } if name == "broken")));
    }
}
