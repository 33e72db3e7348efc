//! # Ledger
//!
//! One issued token: its balance table, its immutable [`FeePolicy`] and the
//! transfer split that policy drives.
//!
//! ## Transfer
//!
//! A transfer is computed in full before anything moves. The split comes
//! from [`FeePolicy::split`]; the four movements (burn, reflection, tax, net)
//! are then staged against a scratch copy of the touched balances and only
//! committed once all of them succeeded. Events are journaled after the
//! commit, so a failed transfer leaves no trace at all.
//!
//! ## Journal
//!
//! Every committed change is journaled as an [`EventRecord`] with a
//! per-ledger sequence number. The journal keeps only the most recent
//! records (see [`Ledger::set_journal_capacity`]); sequence numbers never
//! restart, so gaps only ever appear at the front.
//!
//! ## Conservation
//!
//! At every observable point:
//!
//! - `sum(balances) == total_supply` (the reserve account included), and
//! - `total_supply + total_burned == initial_supply`.
//!
//! [`Ledger::verify_conservation`] checks both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use thiserror::Error;

use crate::account::{Account, LedgerId};
use crate::config::{DEFAULT_JOURNAL_CAPACITY, MIN_JOURNAL_CAPACITY, TOKEN_DECIMALS};
use crate::events::{EventRecord, LedgerEvent};
use crate::policy::{FeePolicy, FeePolicyParams, FeeSplit, ValidationError};
use crate::reflection::ReflectionPool;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The sender does not hold enough tokens.
    #[error("insufficient balance: account has {balance}, tried to send {amount}")]
    InsufficientBalance {
        /// Current balance of the sender.
        balance: u64,
        /// Amount the caller tried to send.
        amount: u64,
    },

    /// The spender's allowance does not cover the amount.
    #[error("insufficient allowance: approved {allowance}, tried to spend {amount}")]
    InsufficientAllowance {
        /// Remaining allowance.
        allowance: u64,
        /// Amount the spender tried to move.
        amount: u64,
    },

    /// The destination cannot be credited directly.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(Account),

    /// Only named holders can send or delegate their balance. The reserve
    /// pays out through claims alone.
    #[error("invalid sender: {0}")]
    InvalidSender(Account),

    /// The spender is not a named holder.
    #[error("invalid spender: {0}")]
    InvalidSpender(Account),

    /// The proposed owner is not a named holder.
    #[error("invalid owner: {0}")]
    InvalidOwner(Account),

    /// No reflection is payable to this holder right now.
    #[error("nothing to claim")]
    NothingToClaim,

    /// A balance or supply update would overflow or underflow.
    #[error("arithmetic overflow while applying ledger update")]
    Overflow,

    /// The balance table no longer adds up to the total supply.
    #[error("conservation invariant violated: {0}")]
    ConservationViolated(String),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Construction parameters for a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerParams {
    /// Human-readable token name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Entire supply, credited to `owner` at creation.
    pub initial_supply: u64,
    /// Fee policy, validated and frozen at creation.
    #[serde(default)]
    pub policy: FeePolicyParams,
    /// First owner and sole initial holder.
    pub owner: Account,
}

/// The outcome of a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Gross amount debited from the sender.
    pub amount: u64,
    /// How the amount was divided.
    pub split: FeeSplit,
}

/// Read-only summary of a ledger for reporting and verification tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub ledger_id: LedgerId,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub creator: Account,
    pub owner: Account,
    pub policy: FeePolicy,
    pub initial_supply: u64,
    pub total_supply: u64,
    pub total_burned: u64,
    pub total_reflection_distributed: u64,
    pub total_claimed: u64,
    pub pool_balance: u64,
    pub holder_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A single token ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    pub(crate) id: LedgerId,
    pub(crate) name: String,
    pub(crate) symbol: String,
    pub(crate) creator: Account,
    pub(crate) owner: Account,
    pub(crate) policy: FeePolicy,
    pub(crate) initial_supply: u64,
    pub(crate) total_supply: u64,
    pub(crate) total_burned: u64,
    pub(crate) balances: HashMap<Account, u64>,
    /// `owner -> (spender -> remaining allowance)`.
    pub(crate) allowances: HashMap<Account, HashMap<Account, u64>>,
    pub(crate) reflection: ReflectionPool,
    /// The most recent events, oldest first.
    pub(crate) events: VecDeque<EventRecord>,
    pub(crate) next_sequence: u64,
    pub(crate) journal_capacity: usize,
    pub(crate) created_at: DateTime<Utc>,
}

impl Ledger {
    /// Validates `params` and builds a ledger whose entire supply belongs to
    /// `params.owner`.
    ///
    /// Nothing is constructed unless every check passes.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered: empty name or symbol,
    /// zero supply, a malformed fee policy, or an owner that is not a named
    /// holder.
    pub fn create(creator: Account, params: LedgerParams) -> Result<Self, ValidationError> {
        let name = params.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let symbol = params.symbol.trim();
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if params.initial_supply == 0 {
            return Err(ValidationError::ZeroSupply);
        }
        let policy = FeePolicy::new(params.policy)?;
        if !params.owner.is_valid_holder() {
            return Err(ValidationError::InvalidOwner);
        }

        let mut balances = HashMap::new();
        balances.insert(params.owner.clone(), params.initial_supply);

        let mut ledger = Self {
            id: LedgerId::generate(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            creator: creator.clone(),
            owner: params.owner.clone(),
            policy,
            initial_supply: params.initial_supply,
            total_supply: params.initial_supply,
            total_burned: 0,
            balances,
            allowances: HashMap::new(),
            reflection: ReflectionPool::default(),
            events: VecDeque::new(),
            next_sequence: 0,
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            created_at: Utc::now(),
        };
        ledger.record(LedgerEvent::LedgerCreated {
            creator,
            owner: params.owner,
            initial_supply: params.initial_supply,
        });
        Ok(ledger)
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Moves `amount` from `sender` to `to`, applying the burn, reflection
    /// and tax split of this ledger's policy.
    ///
    /// The whole operation is atomic: on any error no balance, counter or
    /// event changes.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSender`] if `sender` is not a named
    /// holder, [`LedgerError::InvalidRecipient`] if `to` is the null account
    /// or a blank holder, [`LedgerError::InsufficientBalance`] if `amount`
    /// exceeds the sender's balance, and [`LedgerError::Overflow`] if any
    /// update cannot be represented.
    pub fn transfer(
        &mut self,
        sender: &Account,
        to: &Account,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError> {
        if !sender.is_valid_holder() {
            return Err(LedgerError::InvalidSender(sender.clone()));
        }
        if !to.is_valid_recipient() {
            return Err(LedgerError::InvalidRecipient(to.clone()));
        }

        let balance = self.balance_of(sender);
        if amount > balance {
            return Err(LedgerError::InsufficientBalance { balance, amount });
        }

        let split = self
            .policy
            .split(sender, amount)
            .ok_or(LedgerError::Overflow)?;

        let mut staged = StagedBalances::new(&self.balances);

        // Burn: out of the sender and out of the supply.
        staged.debit(sender, split.burned)?;
        let total_supply = self
            .total_supply
            .checked_sub(split.burned)
            .ok_or(LedgerError::Overflow)?;
        let total_burned = self
            .total_burned
            .checked_add(split.burned)
            .ok_or(LedgerError::Overflow)?;

        // Reflection: into the reserve account's pool.
        staged.debit(sender, split.reflected)?;
        staged.credit(&Account::Reserve, split.reflected)?;
        let total_distributed = self
            .reflection
            .total_distributed
            .checked_add(split.reflected)
            .ok_or(LedgerError::Overflow)?;

        // Tax.
        if let Some(tax_account) = self.policy.tax_account() {
            staged.debit(sender, split.taxed)?;
            staged.credit(tax_account, split.taxed)?;
        }

        // Net.
        staged.debit(sender, split.net)?;
        staged.credit(to, split.net)?;

        let touched = staged.into_touched();

        // Commit.
        self.balances.extend(touched);
        self.total_supply = total_supply;
        self.total_burned = total_burned;
        self.reflection.total_distributed = total_distributed;

        if self.policy.burn_enabled() {
            self.record(LedgerEvent::Burned {
                from: sender.clone(),
                amount: split.burned,
            });
        }
        if self.policy.reflection_enabled() {
            self.record(LedgerEvent::ReflectionPooled {
                from: sender.clone(),
                amount: split.reflected,
            });
        }
        self.record(LedgerEvent::Transferred {
            from: sender.clone(),
            to: to.clone(),
            net: split.net,
            tax: split.taxed,
        });

        tracing::debug!(
            ledger = %self.id,
            from = %sender,
            to = %to,
            amount,
            burned = split.burned,
            reflected = split.reflected,
            taxed = split.taxed,
            net = split.net,
            "transfer applied"
        );

        Ok(TransferReceipt { amount, split })
    }

    /// Sets the amount `spender` may move out of `owner`'s balance,
    /// replacing any previous allowance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSender`] if `owner` is not a named holder
    /// and [`LedgerError::InvalidSpender`] if `spender` is not one.
    pub fn approve(
        &mut self,
        owner: &Account,
        spender: &Account,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if !owner.is_valid_holder() {
            return Err(LedgerError::InvalidSender(owner.clone()));
        }
        if !spender.is_valid_holder() {
            return Err(LedgerError::InvalidSpender(spender.clone()));
        }
        self.allowances
            .entry(owner.clone())
            .or_default()
            .insert(spender.clone(), amount);
        self.record(LedgerEvent::Approval {
            owner: owner.clone(),
            spender: spender.clone(),
            amount,
        });
        Ok(())
    }

    /// Remaining allowance of `spender` over `owner`'s balance.
    pub fn allowance(&self, owner: &Account, spender: &Account) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|s| s.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Transfers on behalf of `from`, consuming `spender`'s allowance.
    ///
    /// The split is exactly the one [`transfer`](Self::transfer) applies with
    /// `from` as the sender. The allowance only shrinks if the transfer
    /// commits.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientAllowance`] if the allowance does not
    /// cover `amount`, plus every error [`transfer`](Self::transfer) can return.
    pub fn transfer_from(
        &mut self,
        spender: &Account,
        from: &Account,
        to: &Account,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError> {
        if !from.is_valid_holder() {
            return Err(LedgerError::InvalidSender(from.clone()));
        }
        let allowance = self.allowance(from, spender);
        if amount > allowance {
            return Err(LedgerError::InsufficientAllowance { allowance, amount });
        }

        let receipt = self.transfer(from, to, amount)?;

        if let Some(remaining) = self
            .allowances
            .get_mut(from)
            .and_then(|s| s.get_mut(spender))
        {
            *remaining -= amount;
        }
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Ownership
    // -----------------------------------------------------------------------

    /// The currently recorded owner. [`Account::Null`] once renounced.
    pub fn owner(&self) -> &Account {
        &self.owner
    }

    /// Records `new_owner` as the owner. Authentication of the caller is the
    /// responsibility of whoever invokes this.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidOwner`] if `new_owner` is not a named holder.
    pub fn transfer_ownership(&mut self, new_owner: Account) -> Result<(), LedgerError> {
        if !new_owner.is_valid_holder() {
            return Err(LedgerError::InvalidOwner(new_owner));
        }
        self.set_owner(new_owner);
        Ok(())
    }

    /// Gives up ownership for good: the owner becomes the null account.
    pub fn renounce_ownership(&mut self) {
        self.set_owner(Account::Null);
    }

    fn set_owner(&mut self, new_owner: Account) {
        let previous = std::mem::replace(&mut self.owner, new_owner.clone());
        tracing::info!(ledger = %self.id, previous = %previous, new = %new_owner, "ownership transferred");
        self.record(LedgerEvent::OwnershipTransferred {
            previous,
            new: new_owner,
        });
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn id(&self) -> LedgerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        TOKEN_DECIMALS
    }

    pub fn creator(&self) -> &Account {
        &self.creator
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The immutable fee policy.
    pub fn fee_policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Balance of `account`, or 0 if it never held anything.
    pub fn balance_of(&self, account: &Account) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u64 {
        self.total_supply
    }

    pub fn initial_supply(&self) -> u64 {
        self.initial_supply
    }

    pub fn total_burned(&self) -> u64 {
        self.total_burned
    }

    /// Number of accounts with a non-zero balance, the reserve included.
    pub fn holder_count(&self) -> usize {
        self.balances.values().filter(|b| **b > 0).count()
    }

    /// The retained journal, oldest first.
    pub fn events(&self) -> &VecDeque<EventRecord> {
        &self.events
    }

    /// Retained events with a sequence number of at least `sequence`.
    pub fn events_since(&self, sequence: u64) -> Vec<EventRecord> {
        let first = self.next_sequence - self.events.len() as u64;
        let skip = usize::try_from(sequence.max(first) - first).unwrap_or(usize::MAX);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Sequence number the next event will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn journal_capacity(&self) -> usize {
        self.journal_capacity
    }

    /// Bounds the journal to the `capacity` most recent events, evicting
    /// older ones right away. Raised to [`MIN_JOURNAL_CAPACITY`] if lower.
    pub fn set_journal_capacity(&mut self, capacity: usize) {
        self.journal_capacity = capacity.max(MIN_JOURNAL_CAPACITY);
        while self.events.len() > self.journal_capacity {
            self.events.pop_front();
        }
    }

    pub fn info(&self) -> LedgerInfo {
        LedgerInfo {
            ledger_id: self.id,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals(),
            creator: self.creator.clone(),
            owner: self.owner.clone(),
            policy: self.policy.clone(),
            initial_supply: self.initial_supply,
            total_supply: self.total_supply,
            total_burned: self.total_burned,
            total_reflection_distributed: self.reflection.total_distributed,
            total_claimed: self.reflection.total_claimed,
            pool_balance: self.pool_balance(),
            holder_count: self.holder_count(),
            created_at: self.created_at,
        }
    }

    /// Checks both conservation equations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConservationViolated`] describing the first
    /// equation that does not hold.
    pub fn verify_conservation(&self) -> Result<(), LedgerError> {
        let sum: u128 = self.balances.values().map(|b| *b as u128).sum();
        if sum != self.total_supply as u128 {
            return Err(LedgerError::ConservationViolated(format!(
                "sum of balances ({}) != total supply ({})",
                sum, self.total_supply
            )));
        }

        let accounted = self.total_supply as u128 + self.total_burned as u128;
        if accounted != self.initial_supply as u128 {
            return Err(LedgerError::ConservationViolated(format!(
                "total supply ({}) + burned ({}) != initial supply ({})",
                self.total_supply, self.total_burned, self.initial_supply
            )));
        }
        Ok(())
    }

    pub(crate) fn record(&mut self, event: LedgerEvent) {
        if self.events.len() >= self.journal_capacity {
            self.events.pop_front();
        }
        self.events.push_back(EventRecord {
            ledger_id: self.id,
            sequence: self.next_sequence,
            recorded_at: Utc::now(),
            event,
        });
        self.next_sequence += 1;
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// Balance updates staged against the live table without touching it.
///
/// Reads fall through to the live table until an account is first touched;
/// from then on the staged value is used, so aliased accounts (sender ==
/// recipient, recipient == tax account, ...) compose correctly.
pub(crate) struct StagedBalances<'a> {
    live: &'a HashMap<Account, u64>,
    touched: BTreeMap<Account, u64>,
}

impl<'a> StagedBalances<'a> {
    pub(crate) fn new(live: &'a HashMap<Account, u64>) -> Self {
        Self {
            live,
            touched: BTreeMap::new(),
        }
    }

    fn current(&self, account: &Account) -> u64 {
        self.touched
            .get(account)
            .or_else(|| self.live.get(account))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn debit(&mut self, account: &Account, amount: u64) -> Result<(), LedgerError> {
        let updated = self
            .current(account)
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        self.touched.insert(account.clone(), updated);
        Ok(())
    }

    pub(crate) fn credit(&mut self, account: &Account, amount: u64) -> Result<(), LedgerError> {
        let updated = self
            .current(account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.touched.insert(account.clone(), updated);
        Ok(())
    }

    pub(crate) fn into_touched(self) -> BTreeMap<Account, u64> {
        self.touched
    }
}
