//! External asset registry adapter
//!
//! The marketplace never owns non-fungible asset identity; it reads
//! ownership and approval state from the registry and asks it to execute
//! transfers once funds are confirmed released. This module defines the
//! narrow interface the coordinator consumes plus an in-memory registry
//! used by tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EscrowResult,
    error::EscrowError,
    models::{Account, AssetId},
};

/// Narrow interface to the external non-fungible asset registry
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    /// Current owner of the asset
    async fn owner_of(&self, asset_id: AssetId) -> EscrowResult<Account>;

    /// Grant `operator` transfer rights over the asset on behalf of `owner`.
    /// Fails if `owner` is not the current owner.
    async fn approve(&self, owner: &str, asset_id: AssetId, operator: &str) -> EscrowResult<()>;

    /// Check whether `operator` currently holds transfer approval
    async fn is_approved_for(&self, asset_id: AssetId, operator: &str) -> EscrowResult<bool>;

    /// Transfer the asset from `from` to `to`. Fails if `from` is not the
    /// current owner or if `operator` lacks approval.
    async fn transfer_from(
        &self,
        operator: &str,
        from: &str,
        to: &str,
        asset_id: AssetId,
    ) -> EscrowResult<()>;
}

#[derive(Debug, Clone)]
struct AssetEntry {
    owner: Account,
    approved: Option<Account>,
}

/// In-memory asset registry (a real deployment talks to the external
/// registry instead)
#[derive(Debug, Default)]
pub struct InMemoryAssetRegistry {
    assets: Arc<RwLock<HashMap<AssetId, AssetEntry>>>,
    next_id: Arc<RwLock<AssetId>>,
}

impl InMemoryAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new asset to `owner` and return its identifier
    pub async fn mint(&self, owner: &str) -> AssetId {
        let mut next_id = self.next_id.write().await;
        let asset_id = *next_id;
        *next_id += 1;

        self.assets.write().await.insert(
            asset_id,
            AssetEntry {
                owner: owner.to_string(),
                approved: None,
            },
        );

        asset_id
    }
}

#[async_trait]
impl AssetRegistry for InMemoryAssetRegistry {
    async fn owner_of(&self, asset_id: AssetId) -> EscrowResult<Account> {
        self.assets
            .read()
            .await
            .get(&asset_id)
            .map(|entry| entry.owner.clone())
            .ok_or_else(|| EscrowError::registry(format!("unknown asset {asset_id}")))
    }

    async fn approve(&self, owner: &str, asset_id: AssetId, operator: &str) -> EscrowResult<()> {
        let mut assets = self.assets.write().await;
        let entry = assets
            .get_mut(&asset_id)
            .ok_or_else(|| EscrowError::registry(format!("unknown asset {asset_id}")))?;

        if entry.owner != owner {
            return Err(EscrowError::registry(format!(
                "{owner} is not the owner of asset {asset_id}"
            )));
        }

        entry.approved = Some(operator.to_string());
        Ok(())
    }

    async fn is_approved_for(&self, asset_id: AssetId, operator: &str) -> EscrowResult<bool> {
        self.assets
            .read()
            .await
            .get(&asset_id)
            .map(|entry| entry.approved.as_deref() == Some(operator))
            .ok_or_else(|| EscrowError::registry(format!("unknown asset {asset_id}")))
    }

    async fn transfer_from(
        &self,
        operator: &str,
        from: &str,
        to: &str,
        asset_id: AssetId,
    ) -> EscrowResult<()> {
        let mut assets = self.assets.write().await;
        let entry = assets
            .get_mut(&asset_id)
            .ok_or_else(|| EscrowError::registry(format!("unknown asset {asset_id}")))?;

        if entry.owner != from {
            return Err(EscrowError::registry(format!(
                "{from} is not the owner of asset {asset_id}"
            )));
        }

        let operator_allowed = operator == from || entry.approved.as_deref() == Some(operator);
        if !operator_allowed {
            return Err(EscrowError::registry(format!(
                "{operator} lacks transfer approval for asset {asset_id}"
            )));
        }

        entry.owner = to.to_string();
        // approvals do not survive a transfer
        entry.approved = None;
        Ok(())
    }
}
