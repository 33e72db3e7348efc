// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Prism Contracts
//!
//! The accounting engine behind Prism token ledgers. Every ledger carries an
//! immutable fee policy and splits each transfer into up to four parts:
//!
//! - **Burn**: destroyed, shrinking the total supply.
//! - **Reflection**: pooled in the ledger's reserve account and shared
//!   pro rata among holders, who claim it on demand.
//! - **Tax**: sent to a fixed tax account.
//! - **Net**: what the recipient actually receives.
//!
//! ## Modules
//!
//! - [`policy`]: the fee policy value object and the split cascade.
//! - [`ledger`]: balances, transfers, allowances, ownership.
//! - [`reflection`]: the pooled reflection accountant (claim / peek).
//! - [`factory`]: validation, construction and the creator-indexed registry.
//! - [`registry`]: the concurrent registry with one lock per ledger.
//! - [`account`], [`events`], [`config`]: supporting types and constants.
//!
//! ## Design Principles
//!
//! 1. Every balance and supply update is checked; products are taken in
//!    `u128` so percentage and pro-rata math cannot overflow.
//! 2. A mutation either commits in full or leaves no trace, events included.
//! 3. `sum(balances) == total_supply` and
//!    `total_supply + total_burned == initial_supply` hold after every call.
//! 4. Every value that crosses the node API (policies, receipts, events,
//!    ledger summaries) is serializable with serde.

pub mod account;
pub mod config;
pub mod events;
pub mod factory;
pub mod ledger;
pub mod policy;
pub mod reflection;
pub mod registry;

pub use account::{Account, LedgerId};
pub use events::{EventRecord, LedgerEvent};
pub use factory::{FactoryError, LedgerFactory};
pub use ledger::{Ledger, LedgerError, LedgerInfo, LedgerParams, TransferReceipt};
pub use policy::{FeePolicy, FeePolicyParams, FeeSplit, ValidationError};
pub use registry::{Applied, EventSink, SharedRegistry};
