//! Escrowed marketplace for non-fungible tokens
//!
//! This crate implements a custodial trade system built from two halves:
//! - A payment vault holding deposited funds in an append-only
//!   authorized-payment ledger, gated by a role registry
//! - A trade coordinator driving the seller-register, buyer-offer,
//!   owner-confirm lifecycle against an external asset registry
//!
//! Funds only ever leave custody through an authorized, auditable path:
//! payment collection, owner-approved cancellation, or the emergency
//! escape hatch.

pub mod access_control;
pub mod asset_registry;
pub mod error;
pub mod events;
pub mod marketplace;
pub mod models;
pub mod settlement;
pub mod vault;

use error::EscrowError;

/// Result type alias for vault and marketplace operations
pub type EscrowResult<T> = Result<T, EscrowError>;
