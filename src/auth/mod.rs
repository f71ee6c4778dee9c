//! Wallet authentication and authorization
//!
//! Turns an inbound HTTP request into a verified [`Identity`] with a bounded
//! permission set, or rejects it with a stable error code.
//!
//! # Authentication Methods
//!
//! - **Bearer tokens**: HS256 session tokens carrying `walletAddress`,
//!   `permissions`, `sessionId` and `exp` claims
//! - **Wallet signatures**: EIP-191 `personal_sign` signatures over a
//!   challenge message built from the wallet address and a millisecond timestamp
//!
//! # Authorization Model
//!
//! Capabilities are plain strings (`read_status`, `generate_content`,
//! `manage_agent`, `collaborate`, `transfer_agent`). Agent resources are gated
//! by an [`OwnershipRegistry`] and an optional per-route allow-list.
//!
//! # Rate Limiting
//!
//! Per-wallet fixed 60-second windows, restarted lazily on the first request
//! after expiry.
//!
//! # Configuration
//!
//! - `AUTH_MODE`: `required` (default) or `disabled` for development
//! - `JWT_SECRET`: HMAC secret for session tokens
//! - `RATE_LIMIT_PER_MINUTE`: default per-wallet budget

mod middleware;
mod ownership;
mod permissions;
mod rate_limit;
mod signature;
mod token;
mod verifier;

pub use middleware::*;
pub use ownership::*;
pub use permissions::*;
pub use rate_limit::*;
pub use signature::*;
pub use token::*;
pub use verifier::*;

use std::collections::BTreeSet;

use axum::http::HeaderMap;
use serde::Serialize;

/// Claimed wallet address.
pub const WALLET_ADDRESS_HEADER: &str = "x-wallet-address";
/// Signature proof, alternative to a bearer token.
pub const WALLET_SIGNATURE_HEADER: &str = "x-wallet-signature";
/// Epoch milliseconds paired with the signature proof.
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
/// Resource identifier for ownership and allow-list checks.
pub const AGENT_ID_HEADER: &str = "x-agent-id";

/// Normalize a wallet address for comparison and keying.
pub fn normalize_wallet(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// How an identity was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Bearer session token
    Token,
    /// Signed challenge message
    Signature,
}

/// Verified caller identity for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Lowercase wallet address
    pub wallet_address: String,

    /// Capability strings granted to this caller
    pub permissions: BTreeSet<String>,

    /// How this identity was established (not a durable session)
    pub session_id: String,

    /// Resource ids (agent ids) this caller may operate on
    pub owned_resource_ids: BTreeSet<String>,

    /// Credential used
    pub method: AuthMethod,
}

impl Identity {
    /// Check whether the identity holds a capability
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Capabilities from `required` that this identity lacks
    pub fn missing_permissions<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|p| !self.has_permission(p))
            .map(String::as_str)
            .collect()
    }

    /// Check whether the identity owns a resource (case-insensitive)
    pub fn owns(&self, resource_id: &str) -> bool {
        let wanted = resource_id.trim().to_ascii_lowercase();
        self.owned_resource_ids
            .iter()
            .any(|owned| owned.to_ascii_lowercase() == wanted)
    }
}

/// Credential-related headers of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletHeaders {
    pub wallet_address: Option<String>,
    pub bearer_token: Option<String>,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub agent_id: Option<String>,
}

impl WalletHeaders {
    /// Extract the auth headers. Empty values count as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let bearer_token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self {
            wallet_address: get(WALLET_ADDRESS_HEADER),
            bearer_token,
            signature: get(WALLET_SIGNATURE_HEADER),
            timestamp: get(TIMESTAMP_HEADER),
            agent_id: get(AGENT_ID_HEADER),
        }
    }
}

/// Authentication and authorization failure
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("wallet address required")]
    WalletRequired,

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("signature timestamp outside the freshness window")]
    TimestampExpired,

    #[error("token expired")]
    TokenExpired,

    #[error("token wallet does not match the claimed wallet")]
    WalletMismatch,

    #[error("token is not a three-segment JWT")]
    InvalidTokenFormat,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("insufficient permissions")]
    InsufficientPermissions {
        required: Vec<String>,
        current: Vec<String>,
    },

    #[error("wallet does not own agent {agent_id}")]
    OwnershipFailed { agent_id: String },

    #[error("agent {agent_id} is not allowed on this route")]
    AgentNotAllowed { agent_id: String },

    #[error("internal auth error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn identity(perms: &[&str]) -> Identity {
        Identity {
            wallet_address: "0xabc".to_string(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
            session_id: "signature-1".to_string(),
            owned_resource_ids: ["user-0xabc".to_string()].into_iter().collect(),
            method: AuthMethod::Signature,
        }
    }

    #[test]
    fn test_missing_permissions() {
        let id = identity(&["read_status"]);
        let required = vec!["read_status".to_string(), "manage_agent".to_string()];
        assert_eq!(id.missing_permissions(&required), vec!["manage_agent"]);
    }

    #[test]
    fn test_owns_is_case_insensitive() {
        let id = identity(&[]);
        assert!(id.owns("USER-0xABC"));
        assert!(!id.owns("user-0xdef"));
    }

    #[test]
    fn test_headers_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(WALLET_ADDRESS_HEADER, HeaderValue::from_static(" 0xAbC "));
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer a.b.c"),
        );
        headers.insert(AGENT_ID_HEADER, HeaderValue::from_static(""));

        let extracted = WalletHeaders::from_headers(&headers);
        assert_eq!(extracted.wallet_address.as_deref(), Some("0xAbC"));
        assert_eq!(extracted.bearer_token.as_deref(), Some("a.b.c"));
        assert_eq!(extracted.agent_id, None);
        assert_eq!(extracted.signature, None);
    }

    #[test]
    fn test_non_bearer_authorization_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(WalletHeaders::from_headers(&headers).bearer_token, None);
    }
}
