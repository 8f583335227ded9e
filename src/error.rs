//! Error types for the escrow marketplace
//!
//! Every public operation either fully commits or fails with one of these
//! variants and no state change. Role failures, trade precondition failures,
//! and propagated external failures are kept as separate variants so callers
//! receive the specific rejection reason.

use thiserror::Error;

use crate::models::{AssetId, PaymentId};

/// Main error type for vault and marketplace operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Caller lacks the role required for the attempted operation
    #[error("not {required}")]
    Unauthorized { required: String },

    /// Caller claims seller privileges over an asset it does not own
    #[error("not owner of asset {asset_id}")]
    NotAssetOwner { asset_id: AssetId },

    /// Buyer and current asset owner coincide
    #[error("cannot purchase own asset {asset_id}")]
    CannotPurchaseOwnAsset { asset_id: AssetId },

    /// Offer or payment amount is zero or absent
    #[error("insufficient funds: amount must be greater than zero")]
    InsufficientFunds,

    /// Operation attempted on a nonexistent or already settled payment
    #[error("invalid state for payment {0}")]
    InvalidPaymentState(PaymentId),

    /// Asset registry failure
    #[error("asset registry error: {0}")]
    Registry(String),

    /// Settlement rail failure
    #[error("settlement error: {0}")]
    Settlement(String),
}

impl EscrowError {
    /// Create an unauthorized error naming the missing role
    pub fn unauthorized<S: Into<String>>(required: S) -> Self {
        Self::Unauthorized {
            required: required.into(),
        }
    }

    /// Create an asset registry error
    pub fn registry<S: Into<String>>(msg: S) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a settlement rail error
    pub fn settlement<S: Into<String>>(msg: S) -> Self {
        Self::Settlement(msg.into())
    }
}
