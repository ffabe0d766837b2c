//! Password hashing and verification (Argon2id, PHC strings).

use crate::config::HashingConfig;
use crate::error::{Result, WardenError};
use crate::identity::CredentialHash;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::warn;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("invalid hashing parameters: {0}")]
    Params(String),

    #[error("failed to hash password: {0}")]
    Hash(String),
}

impl From<HashingError> for WardenError {
    fn from(error: HashingError) -> Self {
        match error {
            HashingError::Params(msg) => WardenError::configuration(msg),
            HashingError::Hash(msg) => WardenError::internal(msg),
        }
    }
}

/// Hashes and verifies passwords with a fixed work factor.
///
/// Both operations are CPU-bound; the async variants run them on the
/// blocking pool.
#[derive(Clone)]
pub struct CredentialVerifier {
    argon2: Argon2<'static>,
    /// Hash with the configured parameters, verified against when there is
    /// no stored credential.
    decoy: Arc<OnceLock<CredentialHash>>,
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params = self.argon2.params();
        f.debug_struct("CredentialVerifier")
            .field("m_cost", &params.m_cost())
            .field("t_cost", &params.t_cost())
            .field("p_cost", &params.p_cost())
            .finish()
    }
}

impl CredentialVerifier {
    pub fn new(config: &HashingConfig) -> std::result::Result<Self, HashingError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| HashingError::Params(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            decoy: Arc::new(OnceLock::new()),
        })
    }

    /// Reject passwords outside the accepted length range.
    pub fn check_policy(password: &str) -> Result<()> {
        let len = password.chars().count();
        if len < MIN_PASSWORD_LEN {
            return Err(WardenError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            ))
            .with_context("field", "password"));
        }
        if len > MAX_PASSWORD_LEN {
            return Err(WardenError::validation(format!(
                "password must be at most {} characters",
                MAX_PASSWORD_LEN
            ))
            .with_context("field", "password"));
        }
        Ok(())
    }

    pub fn hash(&self, password: &str) -> std::result::Result<CredentialHash, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HashingError::Hash(e.to_string()))?;
        Ok(CredentialHash::from_phc(hash.to_string()))
    }

    /// `false` for a wrong password and for a stored hash that fails to parse.
    pub fn verify(&self, password: &str, stored: &CredentialHash) -> bool {
        let parsed = match PasswordHash::new(stored.as_phc()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Stored credential hash is not a valid PHC string");
                return false;
            }
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend the cost of one verification without a stored hash, so a login
    /// for an unknown account takes as long as a wrong password.
    pub fn verify_decoy(&self, password: &str) {
        let decoy = match self.decoy.get() {
            Some(decoy) => decoy,
            None => match self.hash("decoy credential") {
                Ok(hash) => self.decoy.get_or_init(|| hash),
                Err(e) => {
                    warn!(error = %e, "Failed to build decoy credential hash");
                    return;
                }
            },
        };
        let _ = self.verify(password, decoy);
    }

    #[cfg(test)]
    pub(crate) fn decoy_built(&self) -> bool {
        self.decoy.get().is_some()
    }

    pub async fn verify_decoy_async(&self, password: String) -> Result<()> {
        let verifier = self.clone();
        tokio::task::spawn_blocking(move || verifier.verify_decoy(&password)).await?;
        Ok(())
    }

    pub async fn hash_async(&self, password: String) -> Result<CredentialHash> {
        let verifier = self.clone();
        let hash = tokio::task::spawn_blocking(move || verifier.hash(&password)).await??;
        Ok(hash)
    }

    pub async fn verify_async(&self, password: String, stored: CredentialHash) -> Result<bool> {
        let verifier = self.clone();
        Ok(tokio::task::spawn_blocking(move || verifier.verify(&password, &stored)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let v = verifier();
        let hash = v.hash("correct horse battery").unwrap();
        assert!(hash.as_phc().starts_with("$argon2id$"));
        assert!(v.verify("correct horse battery", &hash));
        assert!(!v.verify("wrong password", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let v = verifier();
        let a = v.hash("same password").unwrap();
        let b = v.hash("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_fails_verification() {
        let v = verifier();
        assert!(!v.verify("anything", &CredentialHash::from_phc("not-a-phc-string")));
    }

    #[test]
    fn test_default_cost_parameters() {
        let v = CredentialVerifier::new(&HashingConfig::default()).unwrap();
        assert_eq!(v.argon2.params().m_cost(), 19 * 1024);
        assert_eq!(v.argon2.params().t_cost(), 2);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let err = CredentialVerifier::new(&HashingConfig {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        })
        .unwrap_err();
        assert!(matches!(err, HashingError::Params(_)));
    }

    #[test]
    fn test_password_policy() {
        assert!(CredentialVerifier::check_policy("12345678").is_ok());
        assert!(CredentialVerifier::check_policy("short").is_err());
        assert!(CredentialVerifier::check_policy(&"x".repeat(200)).is_err());
    }

    #[test]
    fn test_decoy_hash_uses_configured_parameters() {
        let v = verifier();
        v.verify_decoy("whatever");
        let decoy = v.decoy.get().unwrap().clone();
        assert!(decoy.as_phc().starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));

        // Built once and shared across clones.
        let clone = v.clone();
        clone.verify_decoy("something else");
        assert_eq!(clone.decoy.get(), Some(&decoy));
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let v = verifier();
        let hash = v.hash_async("async password".to_string()).await.unwrap();
        assert!(v.verify_async("async password".to_string(), hash.clone()).await.unwrap());
        assert!(!v.verify_async("other".to_string(), hash).await.unwrap());
    }
}
