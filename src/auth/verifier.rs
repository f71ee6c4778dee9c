//! Credential verification
//!
//! Selects the bearer-token or signature path from the request headers and
//! produces an [`Identity`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info_span, Instrument};

use crate::telemetry::spans;

use super::{
    normalize_wallet, AuthError, AuthMethod, DefaultPermissionResolver, Identity, OwnershipGuard,
    PermissionResolver, SignatureProof, SignatureVerifier, TokenVerifier, WalletHeaders,
};

/// Verifies whichever credential a request carries
pub struct CredentialVerifier {
    tokens: Option<Arc<TokenVerifier>>,
    signatures: Arc<SignatureVerifier>,
    permissions: Arc<dyn PermissionResolver>,
    ownership: OwnershipGuard,
}

impl CredentialVerifier {
    pub fn new(signatures: Arc<SignatureVerifier>) -> Self {
        Self {
            tokens: None,
            signatures,
            permissions: Arc::new(DefaultPermissionResolver::default()),
            ownership: OwnershipGuard::default(),
        }
    }

    pub fn with_tokens(mut self, tokens: Arc<TokenVerifier>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionResolver>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_ownership(mut self, ownership: OwnershipGuard) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn ownership(&self) -> &OwnershipGuard {
        &self.ownership
    }

    pub fn signatures(&self) -> &SignatureVerifier {
        &self.signatures
    }

    pub fn tokens(&self) -> Option<&TokenVerifier> {
        self.tokens.as_deref()
    }

    /// Verify the request's credential
    pub async fn verify(&self, headers: &WalletHeaders) -> Result<Identity, AuthError> {
        let claimed = headers
            .wallet_address
            .as_deref()
            .ok_or(AuthError::WalletRequired)?;
        let wallet = normalize_wallet(claimed);

        let (permissions, session_id, method) = if let Some(token) = &headers.bearer_token {
            let tokens = self
                .tokens
                .as_ref()
                .ok_or_else(|| AuthError::AuthFailed("bearer tokens not configured".to_string()))?;
            let verified = tokens
                .verify(token, &wallet)
                .instrument(info_span!(spans::AUTH_VALIDATE_TOKEN))
                .await?;
            (verified.permissions, verified.session_id, AuthMethod::Token)
        } else if let (Some(signature), Some(timestamp)) = (&headers.signature, &headers.timestamp) {
            let now_ms = Utc::now().timestamp_millis();
            let proof = SignatureProof::parse(&wallet, signature, timestamp)?;
            info_span!(spans::AUTH_VERIFY_SIGNATURE, timestamp = proof.timestamp)
                .in_scope(|| self.signatures.verify(&proof, now_ms))?;
            (
                self.permissions.resolve_permissions(&wallet),
                format!("signature-{now_ms}"),
                AuthMethod::Signature,
            )
        } else {
            return Err(AuthError::AuthFailed("no credentials provided".to_string()));
        };

        let owned_resource_ids = self.ownership.owned_resources(&wallet).await?;

        debug!(wallet = %wallet, method = ?method, "credential verified");

        Ok(Identity {
            wallet_address: wallet,
            permissions,
            session_id,
            owned_resource_ids,
            method,
        })
    }
}
