//! Signed, time-bound identity tokens (HS256 JWT).
//!
//! Tokens are stateless: the only way a token stops working is expiry.
//!
//! ```rust,ignore
//! let tokens = TokenService::new(&config.auth)?;
//! let issued = tokens.issue(identity.id)?;
//! let claims = tokens.verify(&issued.token)?;
//! assert_eq!(claims.identity_id()?, identity.id);
//! ```

use crate::config::AuthConfig;
use crate::error::{Result, WardenError};
use crate::identity::IdentityId;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const ALGORITHM: Algorithm = Algorithm::HS256;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a token was rejected. Every variant surfaces as `InvalidToken`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token subject is not an identity id: {0}")]
    InvalidSubject(String),
}

impl From<TokenError> for WardenError {
    fn from(error: TokenError) -> Self {
        WardenError::invalid_token(error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT claims carried by an identity token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity id, decimal)
    pub sub: String,

    /// Token id
    pub jti: String,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Expiration (unix seconds)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    pub fn identity_id(&self) -> std::result::Result<IdentityId, TokenError> {
        self.sub
            .parse::<i64>()
            .map(IdentityId)
            .map_err(|_| TokenError::InvalidSubject(self.sub.clone()))
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// A freshly issued token as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Issues and verifies identity tokens with a server-held secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: chrono::Duration,
    issuer: Option<String>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &ALGORITHM)
            .field("ttl", &self.ttl)
            .field("leeway_secs", &self.validation.leeway)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(WardenError::configuration("JWT secret must not be empty"));
        }
        let ttl = chrono::Duration::from_std(config.token_ttl)
            .map_err(|e| WardenError::configuration(format!("token_ttl out of range: {}", e)))?;
        if ttl <= chrono::Duration::zero() {
            return Err(WardenError::configuration("token_ttl must be positive"));
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = config.leeway.as_secs();
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            ttl,
            issuer: config.issuer.clone(),
        })
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Issue a token for `identity`, valid from now for the configured lifetime.
    pub fn issue(&self, identity: IdentityId) -> Result<IssuedToken> {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a token as if it had been issued at `issued_at`.
    pub fn issue_at(&self, identity: IdentityId, issued_at: DateTime<Utc>) -> Result<IssuedToken> {
        let expires_at = issued_at + self.ttl;
        let claims = Claims {
            sub: identity.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| WardenError::internal(format!("Failed to sign token: {}", e)))?;

        Ok(IssuedToken {
            token,
            token_type: "Bearer",
            expires_at,
            expires_in: self.ttl.num_seconds(),
        })
    }

    /// Check signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            }
        })?;

        // Subject must parse as an identity id.
        data.claims.identity_id()?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn service() -> TokenService {
        TokenService::new(&AuthConfig::new("super-secret-key-for-testing-only-0123")).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = service();
        let issued = tokens.issue(IdentityId(42)).unwrap();
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.expires_in, 3600);
        assert_eq!(issued.token.split('.').count(), 3);

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.identity_id().unwrap(), IdentityId(42));
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = service();
        let issued = tokens
            .issue_at(IdentityId(1), Utc::now() - chrono::Duration::hours(2))
            .unwrap();
        assert_eq!(tokens.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_zero_leeway_by_default() {
        let tokens = service();
        // Expired ten seconds ago: rejected without configured skew tolerance.
        let issued = tokens
            .issue_at(IdentityId(1), Utc::now() - chrono::Duration::seconds(3610))
            .unwrap();
        assert_eq!(tokens.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_configured_leeway_accepts_recently_expired() {
        let mut config = AuthConfig::new("super-secret-key-for-testing-only-0123");
        config.leeway = Duration::from_secs(120);
        let tokens = TokenService::new(&config).unwrap();
        let issued = tokens
            .issue_at(IdentityId(1), Utc::now() - chrono::Duration::seconds(3610))
            .unwrap();
        assert!(tokens.verify(&issued.token).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let issued = service().issue(IdentityId(1)).unwrap();
        let other =
            TokenService::new(&AuthConfig::new("a-completely-different-secret-value-xyz")).unwrap();
        assert_eq!(other.verify(&issued.token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = service();
        assert!(matches!(tokens.verify("not-a-token"), Err(TokenError::Malformed(_))));
        assert!(matches!(tokens.verify(""), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_non_numeric_subject_is_rejected() {
        let tokens = service();
        let now = Utc::now();
        let claims = Claims {
            sub: "admin".to_string(),
            jti: "x".to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            iss: None,
        };
        let token = encode(&Header::new(ALGORITHM), &claims, &tokens.encoding_key).unwrap();
        assert_eq!(
            tokens.verify(&token),
            Err(TokenError::InvalidSubject("admin".to_string()))
        );
    }

    #[test]
    fn test_issuer_is_enforced_when_configured() {
        let mut config = AuthConfig::new("super-secret-key-for-testing-only-0123");
        config.issuer = Some("warden".to_string());
        let strict = TokenService::new(&config).unwrap();

        let foreign = service().issue(IdentityId(1)).unwrap();
        assert!(matches!(strict.verify(&foreign.token), Err(TokenError::Malformed(_))));

        let own = strict.issue(IdentityId(1)).unwrap();
        assert_eq!(strict.verify(&own.token).unwrap().iss.as_deref(), Some("warden"));
    }

    #[test]
    fn test_empty_secret_is_configuration_error() {
        let err = TokenService::new(&AuthConfig::new("")).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_token_error_maps_to_invalid_token() {
        let err: WardenError = TokenError::Expired.into();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidToken);
    }
}
