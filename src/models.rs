//! Core data models for the escrow marketplace
//!
//! Payment records, asset kinds, and the derived per-asset trade state
//! machine shared by the vault and the marketplace coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a non-fungible asset in the external registry
pub type AssetId = u64;

/// Index of a payment record in the vault's append-only ledger.
/// Assigned at creation time and never reused.
pub type PaymentId = u64;

/// Opaque account address; the core never interprets its contents
pub type Account = String;

/// Kind of value held in custody
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Native currency of the host environment
    Native,
    /// A specific fungible token identifier
    Token(String),
}

/// Payment record state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    /// Funds held in custody, committed to the recipient
    Authorized,
    /// Funds released to the recipient
    Executed,
    /// Authorization withdrawn by the vault owner, funds refunded to the payer
    Cancelled,
}

impl PaymentState {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Cancelled)
    }

    /// Check if this state allows collection or cancellation
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// Element of the vault's ordered, append-only payment ledger.
///
/// `amount` is the custody commitment made at creation; it is never mutated.
/// Records are never deleted and persist as the vault's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub payer: Account,
    pub recipient: Account,
    pub asset_kind: AssetKind,
    pub amount: u64,
    pub state: PaymentState,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Create a new record in the `Authorized` state
    pub fn new(
        payment_id: PaymentId,
        payer: Account,
        recipient: Account,
        asset_kind: AssetKind,
        amount: u64,
    ) -> Self {
        Self {
            payment_id,
            payer,
            recipient,
            asset_kind,
            amount,
            state: PaymentState::Authorized,
            created_at: Utc::now(),
            settled_at: None,
        }
    }
}

/// Derived trade state of a single asset.
///
/// The coordinator never stores this; it is computed on demand from the
/// registry's ownership/approval reads and the vault's payment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeState {
    /// No transfer approval granted to the marketplace
    Unlisted,
    /// Seller has granted the marketplace transfer approval
    Listed,
    /// At least one authorized offer payment exists
    Offered,
    /// Trade confirmed: one payment executed, asset transferred
    Settled,
}

impl TradeState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled)
    }
}

/// Per-kind ledger accounting snapshot, served to oversight roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of `amount` over all `Authorized` records of this kind
    pub outstanding_authorized: u64,
    /// Sum of `amount` over all `Executed` records of this kind
    pub executed: u64,
    /// Cumulative deposits of this kind over the vault's lifetime
    pub deposited: u64,
}
