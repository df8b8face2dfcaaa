//! Bearer token verification.
//!
//! Pure function of (token, key, clock): no I/O and no shared mutable state,
//! so one [`TokenAuthenticator`] is shared by every request without locking.

use std::time::Duration;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    errors::ErrorKind as JwtErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::GateError;

/// Role carried by a token. Anything but `admin` is preserved verbatim so the
/// authorizer can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimedRole {
    Admin,
    Other(String),
}

impl ClaimedRole {
    fn from_claim(raw: &str) -> Self {
        if raw == "admin" {
            ClaimedRole::Admin
        } else {
            ClaimedRole::Other(raw.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ClaimedRole::Admin => "admin",
            ClaimedRole::Other(role) => role,
        }
    }
}

/// Verified claims. Only produced by a successful [`TokenAuthenticator::verify`].
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    pub subject_id: String,
    pub role: ClaimedRole,
    pub email: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Wire form of the claims. Every field is optional here so that missing
/// fields surface as `InvalidToken` instead of a decode error.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

/// Inputs for minting a token.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub subject: String,
    pub role: String,
    pub email: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenGrant {
    /// An admin grant valid from now for `ttl`.
    pub fn admin(subject: impl Into<String>, email: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        Self {
            subject: subject.into(),
            role: "admin".to_string(),
            email: email.into(),
            issued_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }
}

/// Verifies (and, for tooling, mints) HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenAuthenticator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        let issuer = (!config.issuer.is_empty()).then(|| config.issuer.clone());

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        if let Some(iss) = &issuer {
            validation.set_issuer(&[iss.as_str()]);
        }

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
        }
    }

    /// Verify a raw bearer token.
    ///
    /// Order matters: absence, then signature, then expiry, then claim shape.
    /// An expired token with a valid signature is always `TokenExpired`.
    pub fn verify(&self, raw: Option<&str>) -> Result<TokenClaims, GateError> {
        let token = match raw.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(GateError::TokenRequired),
        };

        let data = jsonwebtoken::decode::<WireClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => GateError::TokenExpired,
                _ => {
                    tracing::debug!(error = %e, "Token rejected");
                    GateError::InvalidToken
                }
            })?;

        let claims = data.claims;
        let subject_id = non_empty(claims.sub).ok_or(GateError::InvalidToken)?;
        let role = non_empty(claims.role).ok_or(GateError::InvalidToken)?;
        let email = non_empty(claims.email).ok_or(GateError::InvalidToken)?;
        let expires_at = claims
            .exp
            .and_then(timestamp)
            .ok_or(GateError::InvalidToken)?;

        Ok(TokenClaims {
            subject_id,
            role: ClaimedRole::from_claim(&role),
            email,
            issued_at: claims.iat.and_then(timestamp),
            expires_at,
        })
    }

    /// Verify the bearer token carried by `headers`.
    pub fn verify_headers(&self, headers: &HeaderMap) -> Result<TokenClaims, GateError> {
        self.verify(bearer_token(headers))
    }

    /// Mint a signed token.
    pub fn issue(&self, grant: &TokenGrant) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = WireClaims {
            sub: Some(grant.subject.clone()),
            role: Some(grant.role.clone()),
            email: Some(grant.email.clone()),
            iat: Some(grant.issued_at.timestamp()),
            exp: Some(grant.expires_at.timestamp()),
            iss: self.issuer.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn authenticator() -> TokenAuthenticator {
        TokenAuthenticator::new(&AuthConfig {
            jwt_secret: "unit-test-secret-that-is-long-enough".into(),
            ..AuthConfig::default()
        })
    }

    fn grant() -> TokenGrant {
        TokenGrant::admin(
            "64b7f0c2a1b2c3d4e5f60718",
            "coach@example.com",
            Duration::from_secs(600),
        )
    }

    #[test]
    fn test_valid_token_round_trips_claims() {
        let auth = authenticator();
        let token = auth.issue(&grant()).unwrap();
        let claims = auth.verify(Some(&token)).unwrap();
        assert_eq!(claims.subject_id, "64b7f0c2a1b2c3d4e5f60718");
        assert_eq!(claims.role, ClaimedRole::Admin);
        assert_eq!(claims.email, "coach@example.com");
        assert!(claims.expires_at > Utc::now());
        assert!(claims.issued_at.is_some());
    }

    #[test]
    fn test_missing_token() {
        let auth = authenticator();
        assert!(matches!(auth.verify(None), Err(GateError::TokenRequired)));
        assert!(matches!(auth.verify(Some("  ")), Err(GateError::TokenRequired)));
    }

    #[test]
    fn test_bad_signature_is_invalid() {
        let other = TokenAuthenticator::new(&AuthConfig {
            jwt_secret: "a-completely-different-signing-secret".into(),
            ..AuthConfig::default()
        });
        let token = other.issue(&grant()).unwrap();
        assert!(matches!(
            authenticator().verify(Some(&token)),
            Err(GateError::InvalidToken)
        ));
        assert!(matches!(
            authenticator().verify(Some("not.a.jwt")),
            Err(GateError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_token_is_expired_not_invalid() {
        let auth = authenticator();
        let mut g = grant();
        g.issued_at = Utc::now() - chrono::Duration::hours(2);
        g.expires_at = Utc::now() - chrono::Duration::hours(1);
        let token = auth.issue(&g).unwrap();
        assert!(matches!(auth.verify(Some(&token)), Err(GateError::TokenExpired)));
    }

    #[test]
    fn test_expired_token_with_bad_signature_is_invalid() {
        let other = TokenAuthenticator::new(&AuthConfig {
            jwt_secret: "a-completely-different-signing-secret".into(),
            ..AuthConfig::default()
        });
        let mut g = grant();
        g.expires_at = Utc::now() - chrono::Duration::hours(1);
        let token = other.issue(&g).unwrap();
        assert!(matches!(
            authenticator().verify(Some(&token)),
            Err(GateError::InvalidToken)
        ));
    }

    #[test]
    fn test_missing_email_claim_is_invalid() {
        let auth = authenticator();
        let claims = WireClaims {
            sub: Some("64b7f0c2a1b2c3d4e5f60718".into()),
            role: Some("admin".into()),
            email: None,
            iat: None,
            exp: Some((Utc::now() + chrono::Duration::minutes(5)).timestamp()),
            iss: None,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret-that-is-long-enough"),
        )
        .unwrap();
        assert!(matches!(auth.verify(Some(&token)), Err(GateError::InvalidToken)));
    }

    #[test]
    fn test_non_admin_role_still_verifies() {
        let auth = authenticator();
        let token = auth.issue(&grant().with_role("user")).unwrap();
        let claims = auth.verify(Some(&token)).unwrap();
        assert_eq!(claims.role, ClaimedRole::Other("user".into()));
    }

    #[test]
    fn test_issuer_is_enforced_when_configured() {
        let strict = TokenAuthenticator::new(&AuthConfig {
            jwt_secret: "unit-test-secret-that-is-long-enough".into(),
            issuer: "coachgate".into(),
            ..AuthConfig::default()
        });
        let untagged = authenticator().issue(&grant()).unwrap();
        assert!(matches!(strict.verify(Some(&untagged)), Err(GateError::InvalidToken)));
        let tagged = strict.issue(&grant()).unwrap();
        assert!(strict.verify(Some(&tagged)).is_ok());
    }

    #[test]
    fn test_bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer"));
        assert_eq!(bearer_token(&headers), None);
    }
}
