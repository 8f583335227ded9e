//! Trade coordinator
//!
//! Drives the seller-register, buyer-offer, owner-confirm lifecycle for a
//! single asset, calling the vault for funds custody and the external asset
//! registry for ownership transfer. Listing state is never stored here: an
//! asset is "for sale" exactly while the registry shows the marketplace
//! holding transfer approval, and the trade state is derived on demand.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::{
    EscrowResult,
    asset_registry::AssetRegistry,
    error::EscrowError,
    events::{EscrowEvent, EventLog},
    models::{Account, AssetId, AssetKind, PaymentId, TradeState},
    vault::Vault,
};

/// Configuration for the trade coordinator
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// Address under which this marketplace is authorized in the vault and
    /// approved in the asset registry
    pub account: Account,
}

impl MarketplaceConfig {
    pub fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
        }
    }
}

/// Marketplace coordinating trades between the vault and the asset registry
pub struct Marketplace {
    config: MarketplaceConfig,
    vault: Arc<Vault>,
    registry: Arc<dyn AssetRegistry>,
    /// Offer payments per asset; competing offers coexist until one is
    /// confirmed
    offers: Arc<RwLock<HashMap<AssetId, Vec<PaymentId>>>>,
    /// Executed payment per settled asset
    settled: Arc<RwLock<HashMap<AssetId, PaymentId>>>,
    events: EventLog,
    /// Exclusive guard: no re-entrant operation can run while a trade is
    /// mid-flight between transfer and fund release
    op_guard: Mutex<()>,
}

impl Marketplace {
    pub fn new(
        config: MarketplaceConfig,
        vault: Arc<Vault>,
        registry: Arc<dyn AssetRegistry>,
        events: EventLog,
    ) -> Self {
        Self {
            config,
            vault,
            registry,
            offers: Arc::new(RwLock::new(HashMap::new())),
            settled: Arc::new(RwLock::new(HashMap::new())),
            events,
            op_guard: Mutex::new(()),
        }
    }

    /// Address under which this marketplace acts
    pub fn account(&self) -> &str {
        &self.config.account
    }

    /// List an asset for sale: the caller must be its current owner and
    /// grants this marketplace transfer approval. No listing record is
    /// stored; the registry's approval flag is the source of truth.
    pub async fn register_sale(&self, caller: &str, asset_id: AssetId) -> EscrowResult<()> {
        let _guard = self.op_guard.lock().await;

        let owner = self.registry.owner_of(asset_id).await?;
        if owner != caller {
            return Err(EscrowError::NotAssetOwner { asset_id });
        }

        self.registry
            .approve(caller, asset_id, &self.config.account)
            .await?;

        info!(asset_id, seller = %caller, "asset registered for sale");
        Ok(())
    }

    /// Fund an offer on an asset with native currency. The deposit is taken
    /// into vault custody immediately; any number of competing offers may
    /// coexist, each with its own payment id.
    pub async fn make_offer_with_native(
        &self,
        caller: &str,
        asset_id: AssetId,
        deposit: u64,
    ) -> EscrowResult<PaymentId> {
        let _guard = self.op_guard.lock().await;

        if deposit == 0 {
            return Err(EscrowError::InsufficientFunds);
        }

        let seller = self.registry.owner_of(asset_id).await?;
        if seller == caller {
            return Err(EscrowError::CannotPurchaseOwnAsset { asset_id });
        }

        let payment_id = self
            .vault
            .authorize_payment(
                &self.config.account,
                caller,
                &seller,
                deposit,
                AssetKind::Native,
            )
            .await?;

        self.offers
            .write()
            .await
            .entry(asset_id)
            .or_default()
            .push(payment_id);

        info!(asset_id, payment_id, buyer = %caller, deposit, "offer created");
        self.events
            .publish(EscrowEvent::OfferCreated {
                asset_id,
                payment_id,
                recipient: seller,
                amount: deposit,
            })
            .await;

        Ok(payment_id)
    }

    /// Settle a trade: the selling owner accepts one specific offer payment.
    /// The asset transfer and the fund release are one unit of work; the
    /// fallible registry transfer runs first, so a failed transfer leaves
    /// the payment `Authorized` and custody untouched.
    pub async fn confirm_trade(
        &self,
        caller: &str,
        asset_id: AssetId,
        payment_id: PaymentId,
    ) -> EscrowResult<()> {
        let _guard = self.op_guard.lock().await;

        let seller = self.registry.owner_of(asset_id).await?;
        if seller != caller {
            return Err(EscrowError::NotAssetOwner { asset_id });
        }

        let payment = self
            .vault
            .payment_record(&self.config.account, payment_id)
            .await?;
        if !payment.state.is_outstanding() {
            return Err(EscrowError::InvalidPaymentState(payment_id));
        }
        if payment.recipient != caller {
            return Err(EscrowError::unauthorized("payment recipient"));
        }

        self.registry
            .transfer_from(&self.config.account, caller, &payment.payer, asset_id)
            .await?;
        self.vault
            .collect_authorized_payment(&self.config.account, payment_id)
            .await?;

        self.settled.write().await.insert(asset_id, payment_id);

        info!(asset_id, payment_id, seller = %caller, buyer = %payment.payer, "trade confirmed");
        self.events
            .publish(EscrowEvent::TradeConfirmed {
                payment_id,
                asset_id,
                seller: caller.to_string(),
            })
            .await;

        Ok(())
    }

    /// Derived trade state of an asset, composed from the settlement record,
    /// the vault's payment records and the registry's approval flag
    pub async fn trade_state(&self, asset_id: AssetId) -> EscrowResult<TradeState> {
        if self.settled.read().await.contains_key(&asset_id) {
            return Ok(TradeState::Settled);
        }

        let offer_ids = self
            .offers
            .read()
            .await
            .get(&asset_id)
            .cloned()
            .unwrap_or_default();
        for payment_id in offer_ids {
            let record = self
                .vault
                .payment_record(&self.config.account, payment_id)
                .await?;
            if record.state.is_outstanding() {
                return Ok(TradeState::Offered);
            }
        }

        if self
            .registry
            .is_approved_for(asset_id, &self.config.account)
            .await?
        {
            Ok(TradeState::Listed)
        } else {
            Ok(TradeState::Unlisted)
        }
    }

    /// Payment ids of all offers ever made on an asset
    pub async fn offers_for(&self, asset_id: AssetId) -> Vec<PaymentId> {
        self.offers
            .read()
            .await
            .get(&asset_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        asset_registry::InMemoryAssetRegistry,
        models::PaymentState,
        settlement::InMemoryRail,
        vault::VaultConfig,
    };

    const ADMIN: &str = "admin";
    const MARKET: &str = "market";
    const SELLER: &str = "seller";
    const BUYER: &str = "buyer";

    struct Harness {
        marketplace: Marketplace,
        vault: Arc<Vault>,
        registry: Arc<InMemoryAssetRegistry>,
        rail: Arc<InMemoryRail>,
        events: EventLog,
        asset: AssetId,
    }

    async fn harness() -> Harness {
        tracing_subscriber::fmt()
            .with_test_writer()
            .try_init()
            .ok();

        let events = EventLog::new();
        let rail = Arc::new(InMemoryRail::new());
        let vault = Arc::new(Vault::new(
            VaultConfig::single_controller(ADMIN),
            rail.clone(),
            events.clone(),
        ));
        vault.authorize_marketplace(ADMIN, MARKET, true).await.unwrap();

        let registry = Arc::new(InMemoryAssetRegistry::new());
        let asset = registry.mint(SELLER).await;

        let marketplace = Marketplace::new(
            MarketplaceConfig::new(MARKET),
            vault.clone(),
            registry.clone(),
            events.clone(),
        );

        Harness {
            marketplace,
            vault,
            registry,
            rail,
            events,
            asset,
        }
    }

    #[tokio::test]
    async fn register_sale_requires_asset_owner() {
        let h = harness().await;

        let err = h
            .marketplace
            .register_sale("other", h.asset)
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::NotAssetOwner { asset_id: h.asset });
        assert!(!h.registry.is_approved_for(h.asset, MARKET).await.unwrap());

        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();
        assert!(h.registry.is_approved_for(h.asset, MARKET).await.unwrap());
    }

    #[tokio::test]
    async fn zero_deposit_offer_creates_no_record() {
        let h = harness().await;
        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();

        let err = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 0)
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::InsufficientFunds);
        assert_eq!(
            h.vault.number_of_authorized_payments(ADMIN).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn owner_cannot_offer_on_own_asset() {
        let h = harness().await;
        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();

        let err = h
            .marketplace
            .make_offer_with_native(SELLER, h.asset, 10)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EscrowError::CannotPurchaseOwnAsset { asset_id: h.asset }
        );
    }

    #[tokio::test]
    async fn full_trade_lifecycle() {
        let h = harness().await;
        assert_eq!(
            h.marketplace.trade_state(h.asset).await.unwrap(),
            TradeState::Unlisted
        );

        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();
        assert_eq!(
            h.marketplace.trade_state(h.asset).await.unwrap(),
            TradeState::Listed
        );

        let payment_id = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 10)
            .await
            .unwrap();
        assert_eq!(
            h.vault.get_balance(ADMIN, &AssetKind::Native).await.unwrap(),
            10
        );
        assert_eq!(
            h.marketplace.trade_state(h.asset).await.unwrap(),
            TradeState::Offered
        );

        h.marketplace
            .confirm_trade(SELLER, h.asset, payment_id)
            .await
            .unwrap();

        // funds left custody exactly once, to the seller
        assert_eq!(
            h.vault.get_balance(ADMIN, &AssetKind::Native).await.unwrap(),
            0
        );
        assert_eq!(h.rail.balance_of(SELLER, &AssetKind::Native).await, 10);
        // asset ownership moved to the buyer
        assert_eq!(h.registry.owner_of(h.asset).await.unwrap(), BUYER);
        // ledger shows the payment executed
        let record = h.vault.payment_record(ADMIN, payment_id).await.unwrap();
        assert_eq!(record.state, PaymentState::Executed);
        assert_eq!(
            h.marketplace.trade_state(h.asset).await.unwrap(),
            TradeState::Settled
        );

        let events = h.events.snapshot().await;
        assert!(events.iter().any(|e| matches!(
            e.event,
            EscrowEvent::TradeConfirmed { payment_id: p, asset_id: a, .. }
                if p == payment_id && a == h.asset
        )));
    }

    #[tokio::test]
    async fn confirm_requires_current_asset_owner() {
        let h = harness().await;
        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();
        let payment_id = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 10)
            .await
            .unwrap();

        let err = h
            .marketplace
            .confirm_trade("other", h.asset, payment_id)
            .await
            .unwrap_err();
        assert_eq!(err, EscrowError::NotAssetOwner { asset_id: h.asset });
    }

    #[tokio::test]
    async fn confirm_rejects_payment_for_another_seller() {
        let h = harness().await;
        let other_asset = h.registry.mint("seller2").await;
        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();
        h.marketplace
            .register_sale("seller2", other_asset)
            .await
            .unwrap();

        // payment 0 names SELLER as recipient; seller2 cannot settle with it
        let payment_id = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 10)
            .await
            .unwrap();

        let err = h
            .marketplace
            .confirm_trade("seller2", other_asset, payment_id)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not payment recipient");

        let record = h.vault.payment_record(ADMIN, payment_id).await.unwrap();
        assert_eq!(record.state, PaymentState::Authorized);
    }

    #[tokio::test]
    async fn failed_transfer_leaves_payment_authorized() {
        let h = harness().await;
        // never registered: the marketplace holds no transfer approval
        let payment_id = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 10)
            .await
            .unwrap();

        let err = h
            .marketplace
            .confirm_trade(SELLER, h.asset, payment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Registry(_)));

        // both-or-neither: nothing moved
        assert_eq!(h.registry.owner_of(h.asset).await.unwrap(), SELLER);
        assert_eq!(
            h.vault.get_balance(ADMIN, &AssetKind::Native).await.unwrap(),
            10
        );
        let record = h.vault.payment_record(ADMIN, payment_id).await.unwrap();
        assert_eq!(record.state, PaymentState::Authorized);
        assert_eq!(h.rail.balance_of(SELLER, &AssetKind::Native).await, 0);
    }

    #[tokio::test]
    async fn competing_offers_settle_independently() {
        let h = harness().await;
        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();

        let first = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 10)
            .await
            .unwrap();
        let second = h
            .marketplace
            .make_offer_with_native("buyer2", h.asset, 12)
            .await
            .unwrap();
        assert_eq!(h.marketplace.offers_for(h.asset).await, vec![first, second]);

        h.marketplace
            .confirm_trade(SELLER, h.asset, second)
            .await
            .unwrap();
        assert_eq!(h.registry.owner_of(h.asset).await.unwrap(), "buyer2");

        // the losing offer stays escrowed until the owner reconciles it
        let record = h.vault.payment_record(ADMIN, first).await.unwrap();
        assert_eq!(record.state, PaymentState::Authorized);

        h.vault.cancel_authorized_payment(ADMIN, first).await.unwrap();
        assert_eq!(h.rail.balance_of(BUYER, &AssetKind::Native).await, 10);
        assert_eq!(
            h.vault.get_balance(ADMIN, &AssetKind::Native).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn deauthorized_marketplace_cannot_take_offers() {
        let h = harness().await;
        h.marketplace.register_sale(SELLER, h.asset).await.unwrap();
        h.marketplace
            .make_offer_with_native(BUYER, h.asset, 5)
            .await
            .unwrap();

        h.vault
            .authorize_marketplace(ADMIN, MARKET, false)
            .await
            .unwrap();

        let err = h
            .marketplace
            .make_offer_with_native(BUYER, h.asset, 5)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "not allowed marketplace");
    }
}
