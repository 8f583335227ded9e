//! Escrow payment vault
//!
//! Holds deposited funds against an append-only ledger of authorized
//! payments, with per-asset-kind custody accounting. Marketplaces create and
//! collect payments, oversight roles read custody state, and the escape
//! hatch drains everything to the recovery recipient in an emergency.
//!
//! Custody invariant: per asset kind, executed payouts plus outstanding
//! authorized amounts never exceed cumulative deposits. The ledger never
//! fabricates balance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    EscrowResult,
    access_control::RoleRegistry,
    error::EscrowError,
    events::{EscrowEvent, EventLog},
    models::{Account, AssetKind, LedgerTotals, PaymentId, PaymentRecord, PaymentState},
    settlement::SettlementRail,
};

/// Configuration fixed at vault construction
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Initial vault owner
    pub owner: Account,
    /// Initial emergency-recovery caller
    pub escape_hatch_caller: Account,
    /// Recipient of all custodial balances when the escape hatch fires
    pub escape_hatch_destination: Account,
    /// Optional read-only oversight role
    pub security_guard: Option<Account>,
}

impl VaultConfig {
    /// All control roles and the recovery destination held by one account,
    /// the usual shape right after deployment
    pub fn single_controller(account: &str) -> Self {
        Self {
            owner: account.to_string(),
            escape_hatch_caller: account.to_string(),
            escape_hatch_destination: account.to_string(),
            security_guard: None,
        }
    }
}

struct LedgerState {
    /// Append-only payment records, indexed by `PaymentId`
    payments: Vec<PaymentRecord>,
    /// Current custodial balance per asset kind
    balances: HashMap<AssetKind, u64>,
    /// Cumulative deposits per asset kind over the vault's lifetime
    deposited: HashMap<AssetKind, u64>,
}

impl LedgerState {
    fn new() -> Self {
        Self {
            payments: Vec::new(),
            balances: HashMap::new(),
            deposited: HashMap::new(),
        }
    }

    fn payment(&self, payment_id: PaymentId) -> EscrowResult<&PaymentRecord> {
        self.payments
            .get(payment_id as usize)
            .ok_or(EscrowError::InvalidPaymentState(payment_id))
    }

    fn debit(&mut self, asset_kind: &AssetKind, amount: u64) {
        if let Some(balance) = self.balances.get_mut(asset_kind) {
            *balance = balance.saturating_sub(amount);
        }
    }
}

/// Custodial payment vault: role registry plus escrow ledger
pub struct Vault {
    config: VaultConfig,
    roles: Arc<RwLock<RoleRegistry>>,
    ledger: Arc<RwLock<LedgerState>>,
    rail: Arc<dyn SettlementRail>,
    events: EventLog,
    /// Serializes every operation that releases funds through the rail, so
    /// no re-entrant call can observe a payment between validation and commit
    release_guard: Mutex<()>,
}

impl Vault {
    /// Create a vault with its role set fixed from `config`
    pub fn new(config: VaultConfig, rail: Arc<dyn SettlementRail>, events: EventLog) -> Self {
        let roles = RoleRegistry::new(
            config.owner.clone(),
            config.escape_hatch_caller.clone(),
            config.security_guard.clone(),
        );

        Self {
            config,
            roles: Arc::new(RwLock::new(roles)),
            ledger: Arc::new(RwLock::new(LedgerState::new())),
            rail,
            events,
            release_guard: Mutex::new(()),
        }
    }

    // ---- role administration ----

    /// Reassign vault ownership. Owner only.
    pub async fn change_owner(&self, caller: &str, new_owner: &str) -> EscrowResult<()> {
        let old = self
            .roles
            .write()
            .await
            .change_owner(caller, new_owner.to_string())?;

        info!(old = %old, new = %new_owner, "vault owner changed");
        self.events
            .publish(EscrowEvent::OwnerChanged {
                old,
                new: new_owner.to_string(),
            })
            .await;
        Ok(())
    }

    /// Toggle a marketplace's permission to create and collect payments.
    /// Owner only.
    pub async fn authorize_marketplace(
        &self,
        caller: &str,
        marketplace: &str,
        enabled: bool,
    ) -> EscrowResult<()> {
        self.roles
            .write()
            .await
            .authorize_marketplace(caller, marketplace.to_string(), enabled)?;

        info!(marketplace = %marketplace, enabled, "marketplace authorization changed");
        self.events
            .publish(EscrowEvent::MarketplaceAuthorization {
                marketplace: marketplace.to_string(),
                enabled,
            })
            .await;
        Ok(())
    }

    /// Assign the read-only oversight role. Owner only.
    pub async fn set_security_guard(&self, caller: &str, guard: &str) -> EscrowResult<()> {
        self.roles
            .write()
            .await
            .set_security_guard(caller, guard.to_string())?;

        info!(guard = %guard, "security guard changed");
        self.events
            .publish(EscrowEvent::SecurityGuardChanged {
                guard: guard.to_string(),
            })
            .await;
        Ok(())
    }

    /// Reassign the emergency-recovery caller. Escape-hatch caller or owner.
    pub async fn change_escape_caller(&self, caller: &str, new_caller: &str) -> EscrowResult<()> {
        let old = self
            .roles
            .write()
            .await
            .change_escape_caller(caller, new_caller.to_string())?;

        info!(old = %old, new = %new_caller, "escape hatch caller changed");
        self.events
            .publish(EscrowEvent::EscapeCallerChanged {
                old,
                new: new_caller.to_string(),
            })
            .await;
        Ok(())
    }

    // ---- ledger operations ----

    /// Record a new authorized payment and take `amount` of `asset_kind`
    /// into custody. The deposit and the ledger append are one atomic step:
    /// the funds are considered received by the vault within this call.
    /// Authorized marketplaces only.
    pub async fn authorize_payment(
        &self,
        caller: &str,
        payer: &str,
        recipient: &str,
        amount: u64,
        asset_kind: AssetKind,
    ) -> EscrowResult<PaymentId> {
        self.roles
            .read()
            .await
            .require_authorized_marketplace(caller)?;

        if amount == 0 {
            return Err(EscrowError::InsufficientFunds);
        }

        let payment_id = {
            let mut ledger = self.ledger.write().await;
            let payment_id = ledger.payments.len() as PaymentId;
            ledger.payments.push(PaymentRecord::new(
                payment_id,
                payer.to_string(),
                recipient.to_string(),
                asset_kind.clone(),
                amount,
            ));
            *ledger.balances.entry(asset_kind.clone()).or_insert(0) += amount;
            *ledger.deposited.entry(asset_kind.clone()).or_insert(0) += amount;
            payment_id
        };

        info!(payment_id, payer = %payer, recipient = %recipient, amount, "payment authorized");
        self.events
            .publish(EscrowEvent::PaymentAuthorized {
                payment_id,
                recipient: recipient.to_string(),
                asset_kind,
                amount,
            })
            .await;

        Ok(payment_id)
    }

    /// Release an authorized payment to its recipient and mark it
    /// `Executed`. Authorized marketplaces only. Collecting the same id a
    /// second time fails `InvalidPaymentState`; custody changes exactly
    /// once. A rail failure aborts with the record still `Authorized`.
    pub async fn collect_authorized_payment(
        &self,
        caller: &str,
        payment_id: PaymentId,
    ) -> EscrowResult<()> {
        let _guard = self.release_guard.lock().await;
        self.roles
            .read()
            .await
            .require_authorized_marketplace(caller)?;

        let (recipient, asset_kind, amount) = {
            let ledger = self.ledger.read().await;
            let record = ledger.payment(payment_id)?;
            if !record.state.is_outstanding() {
                return Err(EscrowError::InvalidPaymentState(payment_id));
            }
            (
                record.recipient.clone(),
                record.asset_kind.clone(),
                record.amount,
            )
        };

        // the only fallible external step runs before the transition commits
        self.rail.credit(&recipient, &asset_kind, amount).await?;

        {
            let mut ledger = self.ledger.write().await;
            ledger.debit(&asset_kind, amount);
            if let Some(record) = ledger.payments.get_mut(payment_id as usize) {
                record.state = PaymentState::Executed;
                record.settled_at = Some(Utc::now());
            }
        }

        info!(payment_id, recipient = %recipient, amount, "payment executed");
        self.events
            .publish(EscrowEvent::PaymentExecuted {
                payment_id,
                recipient,
                asset_kind,
                amount,
            })
            .await;

        Ok(())
    }

    /// Withdraw an authorized payment, refunding its payer, and mark it
    /// `Cancelled`. This is the reconciliation path for offers that are
    /// never confirmed. Owner only.
    pub async fn cancel_authorized_payment(
        &self,
        caller: &str,
        payment_id: PaymentId,
    ) -> EscrowResult<()> {
        let _guard = self.release_guard.lock().await;
        self.roles.read().await.require_owner(caller)?;

        let (payer, asset_kind, amount) = {
            let ledger = self.ledger.read().await;
            let record = ledger.payment(payment_id)?;
            if !record.state.is_outstanding() {
                return Err(EscrowError::InvalidPaymentState(payment_id));
            }
            (record.payer.clone(), record.asset_kind.clone(), record.amount)
        };

        self.rail.credit(&payer, &asset_kind, amount).await?;

        {
            let mut ledger = self.ledger.write().await;
            ledger.debit(&asset_kind, amount);
            if let Some(record) = ledger.payments.get_mut(payment_id as usize) {
                record.state = PaymentState::Cancelled;
                record.settled_at = Some(Utc::now());
            }
        }

        info!(payment_id, payer = %payer, amount, "payment cancelled and refunded");
        self.events
            .publish(EscrowEvent::PaymentCancelled {
                payment_id,
                payer,
                asset_kind,
                amount,
            })
            .await;

        Ok(())
    }

    // ---- emergency recovery ----

    /// Drain every custodial balance to the configured recovery recipient,
    /// bypassing per-payment release. Payment records are left untouched, so
    /// the ledger's bookkeeping is intentionally out of sync with custody
    /// afterwards; the vault is expected to be retired, not resumed.
    /// Escape-hatch caller or owner only.
    pub async fn escape_hatch(&self, caller: &str) -> EscrowResult<Vec<(AssetKind, u64)>> {
        let _guard = self.release_guard.lock().await;
        self.roles
            .read()
            .await
            .require_escape_caller_or_owner(caller)?;

        let held: Vec<(AssetKind, u64)> = {
            let ledger = self.ledger.read().await;
            ledger
                .balances
                .iter()
                .filter(|(_, amount)| **amount > 0)
                .map(|(kind, amount)| (kind.clone(), *amount))
                .collect()
        };

        let destination = self.config.escape_hatch_destination.clone();
        let mut drained = Vec::new();
        for (asset_kind, amount) in held {
            self.rail.credit(&destination, &asset_kind, amount).await?;
            self.ledger
                .write()
                .await
                .balances
                .insert(asset_kind.clone(), 0);
            drained.push((asset_kind, amount));
        }

        warn!(caller = %caller, destination = %destination, "escape hatch invoked");
        self.events
            .publish(EscrowEvent::EscapeHatchCalled {
                destination,
                drained: drained.clone(),
            })
            .await;

        Ok(drained)
    }

    // ---- gated reads ----

    /// Number of records ever appended to the ledger. Oversight roles only.
    pub async fn number_of_authorized_payments(&self, caller: &str) -> EscrowResult<u64> {
        self.roles.read().await.require_oversight(caller)?;
        Ok(self.ledger.read().await.payments.len() as u64)
    }

    /// Current custodial balance of `asset_kind`. Oversight roles only;
    /// deliberately closed to marketplaces so integrations cannot probe
    /// custody state.
    pub async fn get_balance(&self, caller: &str, asset_kind: &AssetKind) -> EscrowResult<u64> {
        self.roles.read().await.require_oversight(caller)?;
        Ok(self
            .ledger
            .read()
            .await
            .balances
            .get(asset_kind)
            .copied()
            .unwrap_or(0))
    }

    /// Per-kind accounting snapshot. Oversight roles only.
    pub async fn ledger_totals(
        &self,
        caller: &str,
        asset_kind: &AssetKind,
    ) -> EscrowResult<LedgerTotals> {
        self.roles.read().await.require_oversight(caller)?;

        let ledger = self.ledger.read().await;
        let mut totals = LedgerTotals {
            outstanding_authorized: 0,
            executed: 0,
            deposited: ledger.deposited.get(asset_kind).copied().unwrap_or(0),
        };
        for record in ledger.payments.iter().filter(|r| &r.asset_kind == asset_kind) {
            match record.state {
                PaymentState::Authorized => totals.outstanding_authorized += record.amount,
                PaymentState::Executed => totals.executed += record.amount,
                PaymentState::Cancelled => {}
            }
        }
        Ok(totals)
    }

    /// Look up a single payment record. Oversight roles, plus authorized
    /// marketplaces, which must read recipient and payer to settle trades.
    pub async fn payment_record(
        &self,
        caller: &str,
        payment_id: PaymentId,
    ) -> EscrowResult<PaymentRecord> {
        let roles = self.roles.read().await;
        if !roles.is_oversight(caller) && !roles.is_authorized_marketplace(caller) {
            return Err(EscrowError::unauthorized(
                "oversight role or allowed marketplace",
            ));
        }
        drop(roles);

        self.ledger
            .read()
            .await
            .payment(payment_id)
            .map(|record| record.clone())
    }
}
