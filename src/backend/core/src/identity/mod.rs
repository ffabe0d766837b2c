//! Identity store: user records, credential hashes, and the repository seam.
//!
//! An [`Identity`] is created on registration, mutated on profile update, and
//! never hard-deleted. Its credential hash is only readable inside the crate
//! and never serialized.

use crate::error::{Result, WardenError};
use crate::rbac::models::{Principal, RoleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

numeric_id!(
    /// Strongly-typed identity identifier.
    IdentityId
);

const MAX_EMAIL_LEN: usize = 254;
const MAX_NAME_LEN: usize = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// Credential Hash
// ═══════════════════════════════════════════════════════════════════════════════

/// A PHC-encoded password hash.
///
/// Deliberately neither `Serialize` nor printable: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash(String);

impl CredentialHash {
    pub(crate) fn from_phc(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub(crate) fn as_phc(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialHash(<redacted>)")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// A registered user.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub(crate) credential: CredentialHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub(crate) fn credential(&self) -> &CredentialHash {
        &self.credential
    }

    /// "First Last", falling back to the username and then the email.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.username.clone().unwrap_or_else(|| self.email.clone())
    }
}

/// Input for creating an identity. Built by the account service after the
/// password has been hashed.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub credential: CredentialHash,
    /// Roles assigned in the same atomic step as the insert.
    pub initial_roles: Vec<RoleId>,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.first_name.is_none() && self.last_name.is_none()
    }

    /// Trim every field and reject empty or oversized values.
    pub fn normalized(self) -> Result<Self> {
        Ok(Self {
            username: self.username.map(|u| normalize_username(&u)).transpose()?,
            first_name: self
                .first_name
                .map(|n| normalize_display_name("first_name", &n))
                .transpose()?,
            last_name: self
                .last_name
                .map(|n| normalize_display_name("last_name", &n))
                .transpose()?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Input normalization
// ═══════════════════════════════════════════════════════════════════════════════

/// Trim and lower-case an email, rejecting anything without `local@domain`.
pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(WardenError::validation("email is required").with_context("field", "email"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(WardenError::validation("email is too long").with_context("field", "email"));
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(
            WardenError::validation("email is not a valid address").with_context("field", "email")
        );
    }
    Ok(email)
}

pub fn normalize_username(raw: &str) -> Result<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(
            WardenError::validation("username must not be empty").with_context("field", "username")
        );
    }
    if username.chars().count() > MAX_NAME_LEN || username.chars().any(char::is_whitespace) {
        return Err(WardenError::validation(
            "username must be at most 100 characters without spaces",
        )
        .with_context("field", "username"));
    }
    Ok(username.to_string())
}

fn normalize_display_name(field: &'static str, raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(WardenError::validation(format!("{} must not be empty", field))
            .with_context("field", field));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(WardenError::validation(format!("{} is too long", field))
            .with_context("field", field));
    }
    Ok(name.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Repository
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage for identities.
///
/// `resolve_principal` must return the identity together with its roles and
/// each role's permissions in one round trip; the authentication gate calls
/// it on every request.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>>;

    /// Lookup by normalized (lower-case) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;

    /// Insert an identity and its initial role assignments atomically.
    ///
    /// Fails with `EmailTaken` or `DuplicateName` (username), or `NotFound`
    /// when an initial role does not exist.
    async fn create(&self, new: NewIdentity) -> Result<Identity>;

    /// Apply a profile update. An empty update returns the current record.
    async fn update_profile(&self, id: IdentityId, update: ProfileUpdate) -> Result<Identity>;

    async fn resolve_principal(&self, id: IdentityId) -> Result<Option<Principal>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Admin@Admin.COM ").unwrap(), "admin@admin.com");
        for bad in ["", "   ", "no-at-sign", "@example.com", "a@", "a@b", "a@@b.com", "a b@c.com"] {
            let err = normalize_email(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError, "input: {:?}", bad);
        }
    }

    #[test]
    fn test_normalize_username() {
        assert_eq!(normalize_username(" admin ").unwrap(), "admin");
        assert!(normalize_username("   ").is_err());
        assert!(normalize_username("two words").is_err());
    }

    #[test]
    fn test_profile_update_normalized() {
        let update = ProfileUpdate {
            username: None,
            first_name: Some("  Ada ".to_string()),
            last_name: Some("Lovelace".to_string()),
        }
        .normalized()
        .unwrap();
        assert_eq!(update.first_name.as_deref(), Some("Ada"));
        assert!(!update.is_empty());

        let err = ProfileUpdate {
            first_name: Some(" ".to_string()),
            ..Default::default()
        }
        .normalized()
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_credential_hash_debug_is_redacted() {
        let hash = CredentialHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$salt$hash");
        let debug = format!("{:?}", hash);
        assert!(!debug.contains("argon2id"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_identity_serialization_skips_credential() {
        let now = Utc::now();
        let identity = Identity {
            id: IdentityId(7),
            email: "ada@example.com".to_string(),
            username: None,
            first_name: Some("Ada".to_string()),
            last_name: None,
            credential: CredentialHash::from_phc("$argon2id$secret"),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["id"], 7);
        assert!(json.get("credential").is_none());
        assert!(!json.to_string().contains("argon2id"));
        assert_eq!(identity.display_name(), "Ada");
    }
}
