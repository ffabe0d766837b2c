//! Error handling for Warden Core.
//!
//! This module provides:
//! - A single error type carrying a machine-readable code and a user-safe message
//! - HTTP status code mapping for API responses
//! - Separate internal messages that are logged but never returned to clients
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_core::error::{WardenError, Result};
//!
//! async fn load_role(graph: &dyn RoleGraph, id: RoleId) -> Result<Role> {
//!     graph
//!         .find_role(id)
//!         .await?
//!         .ok_or_else(|| WardenError::not_found("Role", id.to_string()))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Warden operations.
pub type Result<T> = std::result::Result<T, WardenError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Database Errors (2000-2099)
    DatabaseError,
    DatabaseUnavailable,

    // Serialization Errors (2200-2299)
    SerializationError,

    // Authentication/Authorization (4000-4099)
    MissingToken,
    InvalidToken,
    IdentityNotFound,
    InvalidCredentials,
    Unauthenticated,
    Forbidden,

    // Validation Errors (4100-4199)
    ValidationError,

    // Role/Permission Graph Errors (4200-4299)
    NotFound,
    DuplicateName,
    EmailTaken,

    // Throttling (4300-4399)
    RateLimited,

    // Configuration Errors (5000-5099)
    ConfigurationError,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::DatabaseError => 2000,
            Self::DatabaseUnavailable => 2001,

            Self::SerializationError => 2200,

            Self::MissingToken => 4000,
            Self::InvalidToken => 4001,
            Self::IdentityNotFound => 4002,
            Self::InvalidCredentials => 4003,
            Self::Unauthenticated => 4004,
            Self::Forbidden => 4005,

            Self::ValidationError => 4100,

            Self::NotFound => 4200,
            Self::DuplicateName => 4201,
            Self::EmailTaken => 4202,

            Self::RateLimited => 4300,

            Self::ConfigurationError => 5000,

            Self::InternalError => 9000,
        }
    }

    /// Get the HTTP status code for this error.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            // Unauthorized (401)
            Self::MissingToken
            | Self::InvalidToken
            | Self::Unauthenticated
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,

            // Forbidden (403)
            Self::Forbidden => StatusCode::FORBIDDEN,

            // Not Found (404)
            Self::IdentityNotFound | Self::NotFound => StatusCode::NOT_FOUND,

            // Conflict (409)
            Self::DuplicateName | Self::EmailTaken => StatusCode::CONFLICT,

            // Unprocessable Entity (422)
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,

            // Too Many Requests (429)
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // Service Unavailable (503)
            Self::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // Internal Server Error (500)
            Self::DatabaseError
            | Self::SerializationError
            | Self::ConfigurationError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            4200..=4299 => "graph",
            4300..=4399 => "throttling",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// User errors (bad input, missing credentials)
    Low,
    /// Rejected access attempts and throttling
    Medium,
    /// System errors (database failures, misconfiguration)
    High,
    /// Critical errors requiring immediate attention
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MissingToken
            | ErrorCode::ValidationError
            | ErrorCode::NotFound
            | ErrorCode::DuplicateName
            | ErrorCode::EmailTaken
            | ErrorCode::IdentityNotFound
            | ErrorCode::Unauthenticated => Self::Low,

            ErrorCode::InvalidToken
            | ErrorCode::InvalidCredentials
            | ErrorCode::Forbidden
            | ErrorCode::RateLimited => Self::Medium,

            ErrorCode::DatabaseError
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError => Self::High,

            ErrorCode::DatabaseUnavailable | ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (role, permission, identity)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Retry information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none() && self.retry_after_secs.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Warden Core.
///
/// This error type supports:
/// - Structured error codes for API responses
/// - Error chaining with a boxed source
/// - User-friendly vs internal messages
/// - HTTP status code mapping
#[derive(Error, Debug)]
pub struct WardenError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to expose to clients)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for WardenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl WardenError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error (500).
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            message,
        )
    }

    /// Create a not found error for a role, permission, or identity lookup.
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &entity_id))
    }

    /// Create a duplicate name error.
    pub fn duplicate_name(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let name = name.into();
        Self::new(
            ErrorCode::DuplicateName,
            format!("A {} named '{}' already exists", entity_type, name),
        )
        .with_details(ErrorDetails::new().with_entity(&entity_type, &name))
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication Errors
    // ─────────────────────────────────────────────────────────────────────────

    /// No bearer token was supplied with the request.
    pub fn missing_token() -> Self {
        Self::new(ErrorCode::MissingToken, "No token provided")
    }

    /// The token was malformed, expired, or carried a bad signature.
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InvalidToken, "Invalid or expired token", reason)
    }

    /// The token was valid but its identity no longer exists.
    pub fn identity_not_found(identity_id: i64) -> Self {
        Self::new(ErrorCode::IdentityNotFound, "User not found")
            .with_details(ErrorDetails::new().with_entity("identity", identity_id.to_string()))
    }

    /// An authorization check ran without an authenticated identity.
    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "Authentication required")
    }

    /// Login failed; the message is identical for unknown email and wrong password.
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials, "Invalid email or password")
    }

    /// Registration used an email that already belongs to an identity.
    pub fn email_taken() -> Self {
        Self::new(ErrorCode::EmailTaken, "Email is already registered")
    }

    /// Create a rate limited error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimited,
            format!("Too many requests, retry after {}s", retry_after_secs),
        )
        .with_details(ErrorDetails::new().with_retry_after(retry_after_secs))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();
        let status = self.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request rejected"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    http_status = status,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "warden_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

/// Error response for API clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the request was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for API responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// User-friendly error message
    pub message: String,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&WardenError> for ErrorResponse {
    fn from(error: &WardenError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for WardenError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.http_status();
        let response = ErrorResponse::from(&self);

        (status, Json(response)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Common Error Types
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for WardenError {
    fn from(error: sqlx::Error) -> Self {
        let (code, user_msg) = match &error {
            sqlx::Error::RowNotFound => (
                ErrorCode::NotFound,
                "The requested record was not found",
            ),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                    return Self::with_internal(
                        ErrorCode::DuplicateName,
                        "A record with this name already exists",
                        format!("Constraint violation: {}", constraint),
                    )
                    .with_source(error);
                }
                if db_err.is_foreign_key_violation() {
                    return Self::with_internal(
                        ErrorCode::NotFound,
                        "A referenced record was not found",
                        db_err.message().to_string(),
                    )
                    .with_source(error);
                }
                (ErrorCode::DatabaseError, "A database error occurred")
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseUnavailable,
                "Unable to connect to the database",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };

        Self::with_internal(code, user_msg, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for WardenError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(
            ErrorCode::DatabaseError,
            "Database migration failed",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(error: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            error.to_string(),
        )
        .with_source(error)
    }
}

impl From<tokio::task::JoinError> for WardenError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            format!("Blocking task failed: {}", error),
        )
        .with_source(error)
    }
}

impl From<anyhow::Error> for WardenError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<WardenError>() {
            Ok(warden_error) => warden_error,
            Err(error) => Self::with_internal(
                ErrorCode::InternalError,
                "An internal error occurred",
                error.to_string(),
            ),
        }
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(error: config::ConfigError) -> Self {
        let user_msg = match &error {
            config::ConfigError::NotFound(_) => "Required configuration not found",
            config::ConfigError::PathParse(_) | config::ConfigError::FileParse { .. } => {
                "Configuration file is invalid"
            }
            _ => "Configuration error occurred",
        };

        Self::with_internal(ErrorCode::ConfigurationError, user_msg, error.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
