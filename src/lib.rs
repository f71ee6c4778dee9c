//! Wallet Auth Gateway Library
//!
//! Request-authentication gateway for wallet-owned resources: per-wallet rate
//! limiting, bearer-token or signed-challenge verification, capability checks
//! and resource ownership, in front of any Axum handler.
//!
//! ## Modules
//!
//! - [`auth`] - Rate limiter, credential verifiers, permissions, ownership, middleware
//! - [`api`] - Error responses and REST routes
//! - [`telemetry`] - Logging and OpenTelemetry integration
//! - [`server`] - HTTP server bootstrap

pub mod api;
pub mod auth;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use api::{ApiError, ErrorCode};

pub use auth::{
    with_auth, AuthError, AuthOptions, AuthenticatedWallet, CredentialVerifier, GatewayConfig,
    Identity, OwnershipGuard, RateLimiter, WalletAuthGateway,
};
