//! Agent ownership lookup
//!
//! The gateway only asks "which resource ids does this wallet own?". The
//! derived registry answers with the single `user-<wallet>` id; a real
//! on-chain or database registry can be swapped in behind the same trait.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use super::{normalize_wallet, owned_resource_id, AuthError};

/// Source of truth for which agents a wallet may operate on
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait OwnershipRegistry: Send + Sync {
    /// Resource ids owned by `wallet_address`
    async fn resources_owned_by(&self, wallet_address: &str) -> Result<BTreeSet<String>, AuthError>;
}

/// One resource per wallet, derived from the address
#[derive(Debug, Clone, Default)]
pub struct DerivedOwnershipRegistry;

#[async_trait::async_trait]
impl OwnershipRegistry for DerivedOwnershipRegistry {
    async fn resources_owned_by(&self, wallet_address: &str) -> Result<BTreeSet<String>, AuthError> {
        Ok([owned_resource_id(wallet_address)].into_iter().collect())
    }
}

/// In-memory registry with explicit grants, for development and testing
///
/// Every wallet still owns its derived `user-<wallet>` id.
#[derive(Default)]
pub struct InMemoryOwnershipRegistry {
    grants: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryOwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `resource_id` to `wallet_address`
    pub fn grant(&self, wallet_address: &str, resource_id: &str) -> Result<(), AuthError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| AuthError::Internal("ownership registry lock poisoned".to_string()))?;
        grants
            .entry(normalize_wallet(wallet_address))
            .or_default()
            .insert(resource_id.trim().to_ascii_lowercase());
        Ok(())
    }

    /// Remove a grant. Returns whether it existed.
    pub fn revoke(&self, wallet_address: &str, resource_id: &str) -> Result<bool, AuthError> {
        let mut grants = self
            .grants
            .write()
            .map_err(|_| AuthError::Internal("ownership registry lock poisoned".to_string()))?;
        Ok(grants
            .get_mut(&normalize_wallet(wallet_address))
            .map(|set| set.remove(&resource_id.trim().to_ascii_lowercase()))
            .unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl OwnershipRegistry for InMemoryOwnershipRegistry {
    async fn resources_owned_by(&self, wallet_address: &str) -> Result<BTreeSet<String>, AuthError> {
        let grants = self
            .grants
            .read()
            .map_err(|_| AuthError::Internal("ownership registry lock poisoned".to_string()))?;

        let mut owned = grants
            .get(&normalize_wallet(wallet_address))
            .cloned()
            .unwrap_or_default();
        owned.insert(owned_resource_id(wallet_address));
        Ok(owned)
    }
}

/// Compares a requested resource id against what the wallet owns
#[derive(Clone)]
pub struct OwnershipGuard {
    registry: Arc<dyn OwnershipRegistry>,
}

impl OwnershipGuard {
    pub fn new(registry: Arc<dyn OwnershipRegistry>) -> Self {
        Self { registry }
    }

    /// Resource ids owned by the wallet
    pub async fn owned_resources(&self, wallet_address: &str) -> Result<BTreeSet<String>, AuthError> {
        self.registry.resources_owned_by(wallet_address).await
    }

    /// Whether `wallet_address` owns `resource_id` (case-insensitive)
    pub async fn verify_ownership(
        &self,
        resource_id: &str,
        wallet_address: &str,
    ) -> Result<bool, AuthError> {
        let wanted = resource_id.trim().to_ascii_lowercase();
        let owned = self.owned_resources(wallet_address).await?;
        Ok(owned.iter().any(|id| id.to_ascii_lowercase() == wanted))
    }
}

impl Default for OwnershipGuard {
    fn default() -> Self {
        Self::new(Arc::new(DerivedOwnershipRegistry))
    }
}
