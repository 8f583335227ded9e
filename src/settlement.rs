//! Outbound settlement rail
//!
//! The only path by which funds leave vault custody. Payment collection,
//! owner cancellation refunds and the escape hatch all credit recipients
//! through this trait; the host environment supplies the real fund movement.
//! The in-memory rail tracks per-account balances so tests can observe net
//! transfers end to end.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EscrowResult,
    models::{Account, AssetKind},
};

/// Credits released funds to an account outside the vault
#[async_trait]
pub trait SettlementRail: Send + Sync {
    async fn credit(&self, account: &str, asset_kind: &AssetKind, amount: u64) -> EscrowResult<()>;
}

/// In-memory settlement rail (a real deployment moves actual funds)
#[derive(Debug, Default)]
pub struct InMemoryRail {
    balances: Arc<RwLock<HashMap<(Account, AssetKind), u64>>>,
}

impl InMemoryRail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total credited to `account` in `asset_kind` so far
    pub async fn balance_of(&self, account: &str, asset_kind: &AssetKind) -> u64 {
        self.balances
            .read()
            .await
            .get(&(account.to_string(), asset_kind.clone()))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SettlementRail for InMemoryRail {
    async fn credit(&self, account: &str, asset_kind: &AssetKind, amount: u64) -> EscrowResult<()> {
        let mut balances = self.balances.write().await;
        let entry = balances
            .entry((account.to_string(), asset_kind.clone()))
            .or_insert(0);
        *entry += amount;
        Ok(())
    }
}
