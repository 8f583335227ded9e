//! Role registry and capability checks
//!
//! Holds the vault's role assignments and exposes the predicates every other
//! component evaluates as an explicit precondition before mutating state.
//! Predicates always read the current role state; nothing is cached across
//! calls, so revoking a role takes effect on the next operation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{EscrowResult, error::EscrowError, models::Account};

/// Role assignments for a single vault instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRegistry {
    owner: Account,
    escape_hatch_caller: Account,
    security_guard: Option<Account>,
    authorized_marketplaces: HashSet<Account>,
}

impl RoleRegistry {
    /// Create a registry with the roles fixed at vault construction
    pub fn new(
        owner: Account,
        escape_hatch_caller: Account,
        security_guard: Option<Account>,
    ) -> Self {
        Self {
            owner,
            escape_hatch_caller,
            security_guard,
            authorized_marketplaces: HashSet::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn escape_hatch_caller(&self) -> &str {
        &self.escape_hatch_caller
    }

    pub fn security_guard(&self) -> Option<&str> {
        self.security_guard.as_deref()
    }

    /// Check if the caller is the current owner
    pub fn is_owner(&self, caller: &str) -> bool {
        self.owner == caller
    }

    /// Check if the caller may trigger emergency recovery
    pub fn is_escape_caller_or_owner(&self, caller: &str) -> bool {
        self.escape_hatch_caller == caller || self.is_owner(caller)
    }

    /// Check if the caller is in the authorized marketplace set
    pub fn is_authorized_marketplace(&self, caller: &str) -> bool {
        self.authorized_marketplaces.contains(caller)
    }

    /// Check if the caller may read ledger state: owner, escape-hatch
    /// caller, or the security guard
    pub fn is_oversight(&self, caller: &str) -> bool {
        self.is_escape_caller_or_owner(caller) || self.security_guard.as_deref() == Some(caller)
    }

    pub fn require_owner(&self, caller: &str) -> EscrowResult<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(EscrowError::unauthorized("owner"))
        }
    }

    pub fn require_escape_caller_or_owner(&self, caller: &str) -> EscrowResult<()> {
        if self.is_escape_caller_or_owner(caller) {
            Ok(())
        } else {
            Err(EscrowError::unauthorized("escape hatch caller or owner"))
        }
    }

    pub fn require_authorized_marketplace(&self, caller: &str) -> EscrowResult<()> {
        if self.is_authorized_marketplace(caller) {
            Ok(())
        } else {
            Err(EscrowError::unauthorized("allowed marketplace"))
        }
    }

    pub fn require_oversight(&self, caller: &str) -> EscrowResult<()> {
        if self.is_oversight(caller) {
            Ok(())
        } else {
            Err(EscrowError::unauthorized(
                "owner, escape hatch caller or security guard",
            ))
        }
    }

    /// Reassign ownership. The old owner loses all owner-only rights with
    /// this call. Returns the previous owner.
    pub fn change_owner(&mut self, caller: &str, new_owner: Account) -> EscrowResult<Account> {
        self.require_owner(caller)?;
        Ok(std::mem::replace(&mut self.owner, new_owner))
    }

    /// Toggle marketplace membership. Only addresses added here are ever
    /// members; passing `enabled = false` removes the same address again.
    pub fn authorize_marketplace(
        &mut self,
        caller: &str,
        marketplace: Account,
        enabled: bool,
    ) -> EscrowResult<()> {
        self.require_owner(caller)?;
        if enabled {
            self.authorized_marketplaces.insert(marketplace);
        } else {
            self.authorized_marketplaces.remove(&marketplace);
        }
        Ok(())
    }

    /// Assign the read-only oversight role
    pub fn set_security_guard(&mut self, caller: &str, guard: Account) -> EscrowResult<()> {
        self.require_owner(caller)?;
        self.security_guard = Some(guard);
        Ok(())
    }

    /// Reassign the escape-hatch caller. The current escape-hatch caller may
    /// hand the role off itself; the owner may reassign it at any time.
    /// Returns the previous caller.
    pub fn change_escape_caller(
        &mut self,
        caller: &str,
        new_caller: Account,
    ) -> EscrowResult<Account> {
        self.require_escape_caller_or_owner(caller)?;
        Ok(std::mem::replace(&mut self.escape_hatch_caller, new_caller))
    }
}
