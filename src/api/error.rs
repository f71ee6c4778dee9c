//! Structured API error responses with error codes
//!
//! Every rejection is a JSON body `{ "error": <message>, "code": <CODE>, ... }`
//! with the matching HTTP status and an `x-error-code` header.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors -> 401
    /// No `X-Wallet-Address` header
    WalletRequired,
    /// Signature timestamp outside the freshness window
    TimestampExpired,
    /// Bearer token past its `exp`
    TokenExpired,
    /// Token issued to a different wallet
    WalletMismatch,
    /// Bearer token is not a three-segment JWT
    InvalidTokenFormat,
    /// Credential missing, malformed or not verifiable
    AuthFailed,

    // Authorization errors -> 403
    /// Identity lacks a required capability
    InsufficientPermissions,
    /// Identity does not own the requested agent
    OwnershipFailed,
    /// Agent is not on the route's allow-list
    AgentNotAllowed,

    // Rate limiting -> 429
    /// Too many requests in the current window
    RateLimit,

    // Internal -> 500
    /// Unexpected failure inside the gateway
    AuthError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::WalletRequired
            | ErrorCode::TimestampExpired
            | ErrorCode::TokenExpired
            | ErrorCode::WalletMismatch
            | ErrorCode::InvalidTokenFormat
            | ErrorCode::AuthFailed => StatusCode::UNAUTHORIZED,

            ErrorCode::InsufficientPermissions
            | ErrorCode::OwnershipFailed
            | ErrorCode::AgentNotAllowed => StatusCode::FORBIDDEN,

            ErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::AuthError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::WalletRequired => "WALLET_REQUIRED",
            ErrorCode::TimestampExpired => "TIMESTAMP_EXPIRED",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::WalletMismatch => "WALLET_MISMATCH",
            ErrorCode::InvalidTokenFormat => "INVALID_TOKEN_FORMAT",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::OwnershipFailed => "OWNERSHIP_FAILED",
            ErrorCode::AgentNotAllowed => "AGENT_NOT_ALLOWED",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::AuthError => "AUTH_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for rejected requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message
    pub error: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// Seconds until a rate-limited caller may retry
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Additional top-level fields
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code,
            retry_after: None,
            details: serde_json::Map::new(),
        }
    }

    /// Add a top-level field to the body
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    /// Set retry-after seconds (for rate limiting)
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code;
        let retry_after = self.retry_after;
        let mut response = (status, Json(self)).into_response();

        response.headers_mut().insert(
            header::HeaderName::from_static("x-error-code"),
            HeaderValue::from_static(code.as_str()),
        );

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

// ============================================================================
// Conversion from AuthError
// ============================================================================

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WalletRequired => {
                ApiError::new(ErrorCode::WalletRequired, "Wallet address required")
            }
            AuthError::RateLimited { retry_after_secs } => {
                ApiError::new(ErrorCode::RateLimit, "Rate limit exceeded")
                    .with_retry_after(retry_after_secs)
            }
            AuthError::TimestampExpired => {
                ApiError::new(ErrorCode::TimestampExpired, "Signature timestamp expired")
            }
            AuthError::TokenExpired => ApiError::new(ErrorCode::TokenExpired, "Token expired"),
            AuthError::WalletMismatch => ApiError::new(
                ErrorCode::WalletMismatch,
                "Token wallet does not match wallet address",
            ),
            AuthError::InvalidTokenFormat => {
                ApiError::new(ErrorCode::InvalidTokenFormat, "Invalid token format")
            }
            AuthError::AuthFailed(reason) => {
                ApiError::new(ErrorCode::AuthFailed, format!("Authentication failed: {reason}"))
            }
            AuthError::InsufficientPermissions { required, current } => ApiError::new(
                ErrorCode::InsufficientPermissions,
                "Insufficient permissions",
            )
            .with_field("required", serde_json::json!(required))
            .with_field("current", serde_json::json!(current)),
            AuthError::OwnershipFailed { agent_id } => {
                ApiError::new(ErrorCode::OwnershipFailed, "Agent ownership verification failed")
                    .with_field("agentId", serde_json::json!(agent_id))
            }
            AuthError::AgentNotAllowed { agent_id } => {
                ApiError::new(ErrorCode::AgentNotAllowed, "Agent not allowed")
                    .with_field("agentId", serde_json::json!(agent_id))
            }
            // Never leak internals to the client
            AuthError::Internal(_) => {
                ApiError::new(ErrorCode::AuthError, "Authentication service error")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
