//! Bearer session tokens
//!
//! Tokens are HS256 JWTs carrying the wallet address, capability list and a
//! session id. The signature segment is always verified; the key comes from a
//! [`SessionKeyProvider`] so it can live in a remote key service.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_wallet, AuthError};

/// Claims carried by a wallet session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletClaims {
    /// Wallet the token was issued to
    pub wallet_address: String,

    /// Capability strings
    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Expiration time (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Decoded and checked token contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub wallet_address: String,
    pub permissions: BTreeSet<String>,
    pub session_id: String,
}

/// Resolves the key that verifies a token
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionKeyProvider: Send + Sync {
    /// Key for a token with the given `kid` header
    async fn decoding_key(&self, kid: Option<String>) -> Result<DecodingKey, AuthError>;
}

/// Single shared HMAC secret
#[derive(Clone)]
pub struct StaticSecretKeys {
    key: DecodingKey,
}

impl StaticSecretKeys {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
        }
    }
}

#[async_trait::async_trait]
impl SessionKeyProvider for StaticSecretKeys {
    async fn decoding_key(&self, _kid: Option<String>) -> Result<DecodingKey, AuthError> {
        Ok(self.key.clone())
    }
}

/// Session token verifier and (optionally) issuer
pub struct TokenVerifier {
    keys: Arc<dyn SessionKeyProvider>,
    encoding_key: Option<EncodingKey>,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenVerifier {
    /// Verifier and issuer sharing one HMAC secret
    pub fn hs256(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        Self {
            keys: Arc::new(StaticSecretKeys::new(secret)),
            encoding_key: Some(EncodingKey::from_secret(secret)),
            issuer: issuer.map(str::to_string),
            audience: audience.map(str::to_string),
        }
    }

    /// Verify-only, with keys from an external provider
    pub fn with_provider(keys: Arc<dyn SessionKeyProvider>) -> Self {
        Self {
            keys,
            encoding_key: None,
            issuer: None,
            audience: None,
        }
    }

    /// Issue a token for `wallet_address`
    pub fn issue(
        &self,
        wallet_address: &str,
        permissions: &[String],
        session_id: Option<&str>,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or_else(|| AuthError::Internal("token issuing not configured".to_string()))?;

        let now = Utc::now();
        let claims = WalletClaims {
            wallet_address: wallet_address.to_string(),
            permissions: permissions.to_vec(),
            session_id: Some(
                session_id
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("session-{}", Uuid::new_v4())),
            ),
            exp: Some((now + ttl).timestamp()),
            iat: Some(now.timestamp()),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Some(Uuid::new_v4().to_string()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verify `token` and check it belongs to `claimed_wallet`
    pub async fn verify(&self, token: &str, claimed_wallet: &str) -> Result<VerifiedToken, AuthError> {
        if !is_three_segment(token) {
            return Err(AuthError::InvalidTokenFormat);
        }

        let header = decode_header(token)
            .map_err(|e| AuthError::AuthFailed(format!("invalid token header: {e}")))?;
        let key = self.keys.decoding_key(header.kid).await?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<WalletClaims>(token, &key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::AuthFailed(format!("invalid token: {e}")),
            })?
            .claims;

        let token_wallet = normalize_wallet(&claims.wallet_address);
        if token_wallet != normalize_wallet(claimed_wallet) {
            return Err(AuthError::WalletMismatch);
        }

        let session_id = claims
            .session_id
            .unwrap_or_else(|| format!("token-{}", Utc::now().timestamp_millis()));

        Ok(VerifiedToken {
            wallet_address: token_wallet,
            permissions: claims.permissions.into_iter().collect(),
            session_id,
        })
    }
}

fn is_three_segment(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3 && segments.iter().all(|s| !s.is_empty())
}
