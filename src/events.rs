//! Notification log for external observers
//!
//! Every observable side effect of the vault and the marketplace is appended
//! here for indexers and tests to consume. The core itself never reads the
//! log back; it is an output, not a source of truth.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Account, AssetId, AssetKind, PaymentId};

/// Notifications emitted by the vault and the marketplace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// Vault ownership reassigned
    OwnerChanged { old: Account, new: Account },
    /// Marketplace membership toggled
    MarketplaceAuthorization { marketplace: Account, enabled: bool },
    /// Read-only oversight role assigned
    SecurityGuardChanged { guard: Account },
    /// Emergency-recovery role reassigned
    EscapeCallerChanged { old: Account, new: Account },
    /// New payment appended to the ledger, funds taken into custody
    PaymentAuthorized {
        payment_id: PaymentId,
        recipient: Account,
        asset_kind: AssetKind,
        amount: u64,
    },
    /// Payment collected, funds released to the recipient
    PaymentExecuted {
        payment_id: PaymentId,
        recipient: Account,
        asset_kind: AssetKind,
        amount: u64,
    },
    /// Payment cancelled by the vault owner, funds refunded to the payer
    PaymentCancelled {
        payment_id: PaymentId,
        payer: Account,
        asset_kind: AssetKind,
        amount: u64,
    },
    /// Buyer funded an offer on an asset
    OfferCreated {
        asset_id: AssetId,
        payment_id: PaymentId,
        recipient: Account,
        amount: u64,
    },
    /// Seller confirmed a trade: payment executed and asset transferred
    TradeConfirmed {
        payment_id: PaymentId,
        asset_id: AssetId,
        seller: Account,
    },
    /// Emergency recovery drained custody to the recovery recipient
    EscapeHatchCalled {
        destination: Account,
        drained: Vec<(AssetKind, u64)>,
    },
}

/// A published event with its emission time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub at: DateTime<Utc>,
    pub event: EscrowEvent,
}

/// Append-only in-process event log shared by the vault and the marketplace
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Arc<RwLock<Vec<EventRecord>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the log
    pub async fn publish(&self, event: EscrowEvent) {
        if let Ok(json) = serde_json::to_string(&event) {
            debug!(event = %json, "event published");
        }

        self.records.write().await.push(EventRecord {
            at: Utc::now(),
            event,
        });
    }

    /// Snapshot of all events published so far
    pub async fn snapshot(&self) -> Vec<EventRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
