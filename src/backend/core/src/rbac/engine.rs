//! Authorization decision engine.
//!
//! Answers "may this principal proceed, given the capability the route
//! requires?" over data the authentication gate has already resolved. No I/O
//! and no locks happen here.
//!
//! Precedence is fixed: role names are checked first, then the union of
//! permission names across every held role. The first match wins and there
//! is no deny-override.

use super::models::Principal;
use crate::error::{Result, WardenError};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::slice;
use tracing::debug;

pub const FORBIDDEN_MESSAGE: &str = "Access denied. Insufficient privileges.";

// ═══════════════════════════════════════════════════════════════════════════════
// Required Capability
// ═══════════════════════════════════════════════════════════════════════════════

/// What a route requires of the caller.
///
/// `Role` matches role names only and `Permission` matches permission names
/// only. `AnyOf` matches a name against role names first, then against
/// permission names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "names", rename_all = "snake_case")]
pub enum RequiredCapability {
    Role(String),
    Permission(String),
    AnyOf(Vec<String>),
}

impl RequiredCapability {
    pub fn role(name: impl Into<String>) -> Self {
        Self::Role(name.into())
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self::Permission(name.into())
    }

    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(names.into_iter().map(Into::into).collect())
    }

    fn role_candidates(&self) -> &[String] {
        match self {
            Self::Role(name) => slice::from_ref(name),
            Self::Permission(_) => &[],
            Self::AnyOf(names) => names,
        }
    }

    fn permission_candidates(&self) -> &[String] {
        match self {
            Self::Role(_) => &[],
            Self::Permission(name) => slice::from_ref(name),
            Self::AnyOf(names) => names,
        }
    }
}

impl fmt::Display for RequiredCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(name) => write!(f, "role '{}'", name),
            Self::Permission(name) => write!(f, "permission '{}'", name),
            Self::AnyOf(names) => write!(f, "any of [{}]", names.join(", ")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Which set produced the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Role,
    Permission,
}

/// Evidence for an allow decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub matched_by: MatchedBy,
    pub name: String,
}

impl Grant {
    fn role(name: &str) -> Self {
        Self {
            matched_by: MatchedBy::Role,
            name: name.to_string(),
        }
    }

    fn permission(name: &str) -> Self {
        Self {
            matched_by: MatchedBy::Permission,
            name: name.to_string(),
        }
    }
}

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The action is allowed.
    Allow(Grant),
    /// The action is denied, with a reason for the logs.
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluation
// ═══════════════════════════════════════════════════════════════════════════════

/// Decide whether `principal` satisfies `required`.
pub fn evaluate(principal: &Principal, required: &RequiredCapability) -> PolicyDecision {
    let role_candidates = required.role_candidates();
    if !role_candidates.is_empty() {
        let roles = principal.role_names();
        if let Some(name) = role_candidates.iter().find(|n| roles.contains(n.as_str())) {
            return PolicyDecision::Allow(Grant::role(name));
        }
    }

    let permission_candidates = required.permission_candidates();
    if !permission_candidates.is_empty() {
        let permissions = principal.permission_names();
        if let Some(name) = permission_candidates
            .iter()
            .find(|n| permissions.contains(n.as_str()))
        {
            return PolicyDecision::Allow(Grant::permission(name));
        }
    }

    PolicyDecision::Deny(format!(
        "identity {} lacks {}",
        principal.id(),
        required
    ))
}

/// [`evaluate`] with the error taxonomy applied: no principal is
/// `Unauthenticated`, a deny is `Forbidden`.
pub fn authorize(principal: Option<&Principal>, required: &RequiredCapability) -> Result<Grant> {
    let principal = principal.ok_or_else(WardenError::unauthenticated)?;

    match evaluate(principal, required) {
        PolicyDecision::Allow(grant) => {
            counter!("authz_decisions_total", "decision" => "allow").increment(1);
            debug!(
                identity_id = %principal.id(),
                required = %required,
                matched = %grant.name,
                "Access granted"
            );
            Ok(grant)
        }
        PolicyDecision::Deny(reason) => {
            counter!("authz_decisions_total", "decision" => "deny").increment(1);
            debug!(identity_id = %principal.id(), required = %required, "Access denied");
            Err(WardenError::forbidden(FORBIDDEN_MESSAGE).with_internal_message(reason))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
