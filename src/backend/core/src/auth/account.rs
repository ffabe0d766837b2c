//! Registration, login, and profile flows built from the identity store,
//! the credential verifier, and the token service.

use super::password::CredentialVerifier;
use super::token::{IssuedToken, TokenService};
use crate::error::{Result, WardenError};
use crate::identity::{
    normalize_email, normalize_username, Identity, IdentityId, IdentityRepository, NewIdentity,
    ProfileUpdate,
};
use crate::rbac::graph::RoleGraph;
use crate::rbac::models::{Principal, RoleId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Body of a registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Body of a login request.
#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account flows exposed under `/api/auth`.
#[derive(Clone)]
pub struct AccountService {
    identities: Arc<dyn IdentityRepository>,
    graph: Arc<dyn RoleGraph>,
    verifier: CredentialVerifier,
    tokens: Arc<TokenService>,
    default_role: Option<String>,
}

impl AccountService {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        graph: Arc<dyn RoleGraph>,
        verifier: CredentialVerifier,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            identities,
            graph,
            verifier,
            tokens,
            default_role: None,
        }
    }

    /// Role assigned to every new registration, when it exists.
    pub fn with_default_role(mut self, role: Option<String>) -> Self {
        self.default_role = role.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Create an identity. The email is normalized and must be unused.
    #[instrument(skip(self, request), fields(email = %request.email.trim()))]
    pub async fn register(&self, request: RegisterRequest) -> Result<Identity> {
        let email = normalize_email(&request.email)?;
        CredentialVerifier::check_policy(&request.password)?;
        let profile = ProfileUpdate {
            username: request.username,
            first_name: request.first_name,
            last_name: request.last_name,
        }
        .normalized()?;

        if self.identities.find_by_email(&email).await?.is_some() {
            return Err(WardenError::email_taken());
        }

        let credential = self.verifier.hash_async(request.password).await?;
        let initial_roles = self.default_role_ids().await?;

        let identity = self
            .identities
            .create(NewIdentity {
                email,
                username: profile.username,
                first_name: profile.first_name,
                last_name: profile.last_name,
                credential,
                initial_roles,
            })
            .await?;

        info!(identity_id = %identity.id, "Identity registered");
        Ok(identity)
    }

    /// Verify credentials and issue a token.
    ///
    /// Unknown emails and wrong passwords produce the same error.
    #[instrument(skip(self, password), fields(email = %email.trim()))]
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let email = email.trim().to_lowercase();

        let Some(identity) = self.identities.find_by_email(&email).await? else {
            self.verifier.verify_decoy_async(password.to_string()).await?;
            metrics::counter!("login_attempts_total", "outcome" => "unknown_email").increment(1);
            warn!("Login failed: unknown email");
            return Err(WardenError::invalid_credentials());
        };

        let matches = self
            .verifier
            .verify_async(password.to_string(), identity.credential().clone())
            .await?;
        if !matches {
            metrics::counter!("login_attempts_total", "outcome" => "bad_password").increment(1);
            warn!(identity_id = %identity.id, "Login failed: wrong password");
            return Err(WardenError::invalid_credentials());
        }

        let token = self.tokens.issue(identity.id)?;
        metrics::counter!("login_attempts_total", "outcome" => "success").increment(1);
        info!(identity_id = %identity.id, "Login succeeded");
        Ok(token)
    }

    /// The identity with its roles and per-role permissions.
    pub async fn me(&self, id: IdentityId) -> Result<Principal> {
        self.identities
            .resolve_principal(id)
            .await?
            .ok_or_else(|| WardenError::identity_not_found(id.as_i64()))
    }

    pub async fn update_profile(&self, id: IdentityId, update: ProfileUpdate) -> Result<Identity> {
        let update = update.normalized()?;
        let identity = self.identities.update_profile(id, update).await?;
        info!(identity_id = %id, "Profile updated");
        Ok(identity)
    }

    /// Tokens are stateless; logging out only tells the client to drop its copy.
    pub fn logout_message(&self) -> &'static str {
        "Logged out. Discard the token on the client."
    }

    /// Create the bootstrap admin identity holding `Admin` if the email is unused.
    ///
    /// Returns `true` when a new identity was created.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<bool> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.identities.find_by_email(&email).await? {
            if let Some(admin) = self.graph.find_role_by_name("Admin").await? {
                self.graph.assign_role(existing.id, admin.id).await?;
            }
            return Ok(false);
        }

        CredentialVerifier::check_policy(password)?;
        let admin = self
            .graph
            .find_role_by_name("Admin")
            .await?
            .ok_or_else(|| WardenError::not_found("role", "Admin"))?;
        let credential = self.verifier.hash_async(password.to_string()).await?;
        let username = email
            .split_once('@')
            .map(|(local, _)| local.to_string())
            .and_then(|local| normalize_username(&local).ok());

        let identity = self
            .identities
            .create(NewIdentity {
                email,
                username,
                first_name: Some("Admin".to_string()),
                last_name: None,
                credential,
                initial_roles: vec![admin.id],
            })
            .await?;
        info!(identity_id = %identity.id, email = %identity.email, "Admin identity created");
        Ok(true)
    }

    async fn default_role_ids(&self) -> Result<Vec<RoleId>> {
        let Some(name) = self.default_role.as_deref() else {
            return Ok(Vec::new());
        };
        match self.graph.find_role_by_name(name).await? {
            Some(role) => Ok(vec![role.id]),
            None => {
                warn!(role = %name, "Default registration role does not exist; skipping");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, HashingConfig};
    use crate::db::MemoryStore;
    use crate::error::ErrorCode;
    use crate::rbac::models::NewRole;

    fn service(store: &Arc<MemoryStore>) -> AccountService {
        let verifier = CredentialVerifier::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let tokens = TokenService::new(&AuthConfig::new("k".repeat(32))).unwrap();
        AccountService::new(store.clone(), store.clone(), verifier, Arc::new(tokens))
    }

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "correct horse".to_string(),
            username: None,
            first_name: Some("Ada".to_string()),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn test_register_normalizes_email() {
        let store = Arc::new(MemoryStore::new());
        let identity = service(&store).register(request("  Ada@Example.COM ")).await.unwrap();
        assert_eq!(identity.email, "ada@example.com");
        assert_eq!(identity.first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_register_rejects_taken_email_and_short_password() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(&store);
        accounts.register(request("ada@example.com")).await.unwrap();

        let err = accounts.register(request("ADA@example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmailTaken);

        let mut short = request("bob@example.com");
        short.password = "short".to_string();
        let err = accounts.register(short).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_register_assigns_default_role() {
        let store = Arc::new(MemoryStore::new());
        store.create_role(NewRole::new("Employee")).await.unwrap();
        let accounts = service(&store).with_default_role(Some("Employee".to_string()));

        let identity = accounts.register(request("ada@example.com")).await.unwrap();
        let principal = accounts.me(identity.id).await.unwrap();
        assert!(principal.has_role("Employee"));
    }

    #[tokio::test]
    async fn test_register_skips_unknown_default_role() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(&store).with_default_role(Some("Ghost".to_string()));
        let identity = accounts.register(request("ada@example.com")).await.unwrap();
        assert!(accounts.me(identity.id).await.unwrap().grants.is_empty());
    }

    #[tokio::test]
    async fn test_login_errors_are_indistinguishable() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(&store);
        accounts.register(request("ada@example.com")).await.unwrap();

        let unknown = accounts.login("nobody@example.com", "correct horse").await.unwrap_err();
        let wrong = accounts.login("ada@example.com", "wrong horse").await.unwrap_err();
        assert_eq!(unknown.code(), ErrorCode::InvalidCredentials);
        assert_eq!(wrong.code(), ErrorCode::InvalidCredentials);
        assert_eq!(unknown.user_message(), wrong.user_message());
    }

    #[tokio::test]
    async fn test_unknown_email_still_pays_verification_cost() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(&store);
        assert!(!accounts.verifier.decoy_built());

        let err = accounts.login("nobody@example.com", "correct horse").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCredentials);
        assert!(accounts.verifier.decoy_built());
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let store = Arc::new(MemoryStore::new());
        let accounts = service(&store);
        let identity = accounts.register(request("ada@example.com")).await.unwrap();

        let issued = accounts.login(" ADA@example.com", "correct horse").await.unwrap();
        let claims = accounts.tokens().verify(&issued.token).unwrap();
        assert_eq!(claims.identity_id().unwrap(), identity.id);
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        store.create_role(NewRole::new("Admin")).await.unwrap();
        let accounts = service(&store);

        assert!(accounts.ensure_admin("admin@admin.com", "admin-password").await.unwrap());
        assert!(!accounts.ensure_admin("admin@admin.com", "admin-password").await.unwrap());

        let issued = accounts.login("admin@admin.com", "admin-password").await.unwrap();
        let id = accounts.tokens().verify(&issued.token).unwrap().identity_id().unwrap();
        assert!(accounts.me(id).await.unwrap().has_role("Admin"));
    }
}
