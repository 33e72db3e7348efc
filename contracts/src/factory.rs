//! # Ledger Factory
//!
//! Validates creation parameters, constructs ledgers and keeps the registry:
//! a global, append-only list of every ledger in creation order plus a
//! per-creator index.
//!
//! Creation is all-or-nothing. [`Ledger::create`] runs every check before
//! anything is built, and the registry is only appended to once a ledger
//! exists, so a rejected request leaves no trace.

use std::collections::HashMap;
use thiserror::Error;

use crate::account::{Account, LedgerId};
use crate::ledger::{Ledger, LedgerError, LedgerParams, TransferReceipt};
use crate::policy::{FeePolicy, ValidationError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during factory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    /// The creation parameters were rejected.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// `ledger_at` was asked for a position past the end of the registry.
    #[error("index {index} out of range: {count} ledgers registered")]
    IndexOutOfRange {
        /// The requested position.
        index: usize,
        /// Number of registered ledgers.
        count: usize,
    },

    /// No ledger with this id exists.
    #[error("ledger not found: {0}")]
    LedgerNotFound(LedgerId),

    /// The ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// Registry Index
// ---------------------------------------------------------------------------

/// Append-only ordering of ledger ids, globally and per creator.
#[derive(Debug, Clone, Default)]
pub struct LedgerIndex {
    all: Vec<LedgerId>,
    by_creator: HashMap<Account, Vec<LedgerId>>,
}

impl LedgerIndex {
    /// Records a freshly built ledger under `creator` and announces it.
    /// Both registries go through here, after validation and before the
    /// ledger is stored.
    pub fn register(&mut self, creator: &Account, ledger: &Ledger) -> LedgerId {
        let id = ledger.id();
        tracing::info!(
            ledger = %id,
            creator = %creator,
            symbol = ledger.symbol(),
            supply = ledger.initial_supply(),
            "ledger created"
        );
        self.append(creator, id);
        id
    }

    pub fn append(&mut self, creator: &Account, id: LedgerId) {
        self.all.push(id);
        self.by_creator.entry(creator.clone()).or_default().push(id);
    }

    pub fn count(&self) -> usize {
        self.all.len()
    }

    /// # Errors
    ///
    /// Returns [`FactoryError::IndexOutOfRange`] when `index >= count()`.
    pub fn at(&self, index: usize) -> Result<LedgerId, FactoryError> {
        self.all
            .get(index)
            .copied()
            .ok_or(FactoryError::IndexOutOfRange {
                index,
                count: self.all.len(),
            })
    }

    /// Ledgers created by `creator`, oldest first. Empty for unknown creators.
    pub fn by_creator(&self, creator: &Account) -> &[LedgerId] {
        self.by_creator
            .get(creator)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all(&self) -> &[LedgerId] {
        &self.all
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Owns every ledger it creates. Single-threaded: each `&mut self` call is
/// one atomic unit of work. See [`crate::registry::SharedRegistry`] for the
/// concurrent counterpart.
#[derive(Debug, Clone, Default)]
pub struct LedgerFactory {
    ledgers: HashMap<LedgerId, Ledger>,
    index: LedgerIndex,
}

impl LedgerFactory {
    /// Creates a new, empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `params`, builds the ledger, credits the initial supply to
    /// the owner and registers the ledger under `creator`.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::Validation`] naming the violated constraint.
    /// Nothing is registered in that case.
    pub fn create(
        &mut self,
        creator: &Account,
        params: LedgerParams,
    ) -> Result<LedgerId, FactoryError> {
        let ledger = Ledger::create(creator.clone(), params)?;
        let id = self.index.register(creator, &ledger);
        self.ledgers.insert(id, ledger);
        Ok(id)
    }

    /// Ledgers created by `creator`, in creation order.
    pub fn creator_ledgers(&self, creator: &Account) -> &[LedgerId] {
        self.index.by_creator(creator)
    }

    pub fn ledger_count(&self) -> usize {
        self.index.count()
    }

    /// The `index`-th ledger ever created.
    ///
    /// # Errors
    ///
    /// Returns [`FactoryError::IndexOutOfRange`] when `index >= ledger_count()`.
    pub fn ledger_at(&self, index: usize) -> Result<LedgerId, FactoryError> {
        self.index.at(index)
    }

    pub fn ledger(&self, id: &LedgerId) -> Result<&Ledger, FactoryError> {
        self.ledgers
            .get(id)
            .ok_or(FactoryError::LedgerNotFound(*id))
    }

    pub fn ledger_mut(&mut self, id: &LedgerId) -> Result<&mut Ledger, FactoryError> {
        self.ledgers
            .get_mut(id)
            .ok_or(FactoryError::LedgerNotFound(*id))
    }

    pub fn transfer(
        &mut self,
        id: &LedgerId,
        from: &Account,
        to: &Account,
        amount: u64,
    ) -> Result<TransferReceipt, FactoryError> {
        Ok(self.ledger_mut(id)?.transfer(from, to, amount)?)
    }

    pub fn claim(&mut self, id: &LedgerId, holder: &Account) -> Result<u64, FactoryError> {
        Ok(self.ledger_mut(id)?.claim(holder)?)
    }

    /// Fails only for an unknown ledger; unmet claim preconditions read as 0.
    pub fn peek(&self, id: &LedgerId, holder: &Account) -> Result<u64, FactoryError> {
        Ok(self.ledger(id)?.peek(holder))
    }

    pub fn fee_policy(&self, id: &LedgerId) -> Result<FeePolicy, FactoryError> {
        Ok(self.ledger(id)?.fee_policy().clone())
    }

    pub fn current_owner(&self, id: &LedgerId) -> Result<Account, FactoryError> {
        Ok(self.ledger(id)?.owner().clone())
    }

    pub fn transfer_ownership(
        &mut self,
        id: &LedgerId,
        new_owner: Account,
    ) -> Result<(), FactoryError> {
        Ok(self.ledger_mut(id)?.transfer_ownership(new_owner)?)
    }
}
