//! Wallet signature proofs
//!
//! A caller proves control of a wallet by signing a challenge message built
//! from its address and a millisecond timestamp with EIP-191 `personal_sign`.
//! The message has no random component, so the server rebuilds exactly what
//! the wallet signed. Replays inside the freshness window are rejected by a
//! cache of consumed (wallet, timestamp) challenges.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::Signature;

use super::{normalize_wallet, AuthError};

/// Maximum distance between the signed timestamp and server time
pub const DEFAULT_SIGNATURE_MAX_AGE_MS: i64 = 300_000;

/// Application name shown in the challenge message
pub const DEFAULT_CHALLENGE_DOMAIN: &str = "Agent Gateway";

/// 0x + 65 bytes hex-encoded
const SIGNATURE_HEX_LEN: usize = 130;

/// Signature-based credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureProof {
    pub wallet_address: String,
    pub signature: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl SignatureProof {
    /// Build a proof from raw header values
    pub fn parse(wallet_address: &str, signature: &str, timestamp: &str) -> Result<Self, AuthError> {
        let timestamp = timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| AuthError::AuthFailed("timestamp is not an integer".to_string()))?;

        Ok(Self {
            wallet_address: normalize_wallet(wallet_address),
            signature: signature.trim().to_string(),
            timestamp,
        })
    }
}

/// Build the message a wallet must sign for `timestamp`
pub fn challenge_message(domain: &str, wallet_address: &str, timestamp: i64) -> String {
    format!(
        "{domain} wants you to sign in with your wallet.\n\nWallet: {}\nTimestamp: {timestamp}",
        normalize_wallet(wallet_address)
    )
}

/// Recover the lowercase `0x` address that signed `message`
pub fn recover_signer(message: &str, signature: &str) -> Result<String, AuthError> {
    let hex_part = signature
        .strip_prefix("0x")
        .filter(|_| signature.len() == SIGNATURE_HEX_LEN + 2)
        .ok_or_else(|| AuthError::AuthFailed("malformed signature".to_string()))?;

    let bytes = hex::decode(hex_part)
        .map_err(|_| AuthError::AuthFailed("malformed signature".to_string()))?;

    let signature = Signature::try_from(bytes.as_slice())
        .map_err(|e| AuthError::AuthFailed(format!("invalid signature: {e}")))?;

    let address = signature
        .recover_address_from_msg(message.as_bytes())
        .map_err(|e| AuthError::AuthFailed(format!("signature recovery failed: {e}")))?;

    Ok(format!("0x{}", hex::encode(address.as_slice())))
}

/// Remembers consumed challenges until they could no longer pass the freshness check
///
/// Keyed on the signed content rather than the signature encoding, since one
/// challenge has several valid encodings (`v` as 0/1 or 27/28, high or low `s`).
#[derive(Default)]
pub struct ReplayGuard {
    /// (wallet, timestamp) -> epoch millis after which it can be forgotten
    seen: Mutex<HashMap<(String, i64), i64>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the challenge for `wallet_address` at `timestamp`. Fails if it was
    /// already recorded and is still live.
    pub fn consume(
        &self,
        wallet_address: &str,
        timestamp: i64,
        forget_after: i64,
        now_ms: i64,
    ) -> Result<(), AuthError> {
        let mut seen = self
            .seen
            .lock()
            .map_err(|_| AuthError::Internal("replay cache lock poisoned".to_string()))?;

        seen.retain(|_, expiry| *expiry >= now_ms);

        let key = (normalize_wallet(wallet_address), timestamp);
        if seen.contains_key(&key) {
            return Err(AuthError::AuthFailed("challenge already used".to_string()));
        }
        seen.insert(key, forget_after);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Verifies signature proofs
pub struct SignatureVerifier {
    max_age_ms: i64,
    domain: String,
    replay_guard: Option<ReplayGuard>,
}

impl SignatureVerifier {
    pub fn new(max_age_ms: i64, domain: impl Into<String>, replay_protection: bool) -> Self {
        Self {
            max_age_ms,
            domain: domain.into(),
            replay_guard: replay_protection.then(ReplayGuard::new),
        }
    }

    /// Challenge message for this verifier's domain
    pub fn challenge(&self, wallet_address: &str, timestamp: i64) -> String {
        challenge_message(&self.domain, wallet_address, timestamp)
    }

    pub fn max_age_ms(&self) -> i64 {
        self.max_age_ms
    }

    /// Check freshness, recover the signer, and consume the proof
    pub fn verify(&self, proof: &SignatureProof, now_ms: i64) -> Result<(), AuthError> {
        if now_ms.abs_diff(proof.timestamp) > self.max_age_ms.unsigned_abs() {
            return Err(AuthError::TimestampExpired);
        }

        let message = self.challenge(&proof.wallet_address, proof.timestamp);
        let signer = recover_signer(&message, &proof.signature)?;

        if signer != proof.wallet_address {
            return Err(AuthError::AuthFailed(
                "signature does not match wallet".to_string(),
            ));
        }

        if let Some(guard) = &self.replay_guard {
            guard.consume(
                &proof.wallet_address,
                proof.timestamp,
                proof.timestamp.saturating_add(self.max_age_ms),
                now_ms,
            )?;
        }

        Ok(())
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURE_MAX_AGE_MS, DEFAULT_CHALLENGE_DOMAIN, true)
    }
}
